use crate::calc::{Grade, StudentSummary};
use crate::model::{MarkRecord, Student, Subject};

pub const DEFAULT_REMARK: &str = "Promoted to next class.";

/// Plain-text marks digest, one entry per recorded mark whose subject exists.
pub fn performance_summary(student: &Student, subjects: &[Subject], marks: &[MarkRecord]) -> String {
    let mut out = format!("Student {} marks: ", student.name);
    for m in marks.iter().filter(|m| m.student_id == student.id) {
        if let Some(sub) = subjects.iter().find(|s| s.id == m.subject_id) {
            out.push_str(&format!(
                "{} ({}): {}. ",
                sub.name,
                m.exam_type.as_str(),
                m.theory + m.assessment
            ));
        }
    }
    out
}

/// Source of report-card remarks. The portal ships a template generator;
/// a model-backed one can be swapped in behind the same call.
pub trait RemarkGenerator {
    fn generate(&self, student: &Student, summary: &StudentSummary, performance: &str) -> String;
}

pub struct TemplateRemarks;

impl RemarkGenerator for TemplateRemarks {
    fn generate(&self, student: &Student, summary: &StudentSummary, _performance: &str) -> String {
        let first_name = student
            .name
            .split_whitespace()
            .next()
            .unwrap_or(student.name.as_str());
        if !summary.has_marks() {
            return format!("{} has no marks recorded yet for this session.", first_name);
        }
        match summary.grade {
            Grade::APlus => format!(
                "Outstanding work, {}! Consistent excellence across subjects. Keep shining.",
                first_name
            ),
            Grade::A => format!(
                "Excellent performance by {}. A little more practice can take you to the top.",
                first_name
            ),
            Grade::BPlus => format!(
                "Very good effort, {}. Steady progress shown; aim higher next session.",
                first_name
            ),
            Grade::B => format!(
                "Good work, {}. Regular revision will strengthen your results further.",
                first_name
            ),
            Grade::C => format!(
                "{} has made fair progress. More focus on weaker subjects is advised.",
                first_name
            ),
            Grade::D => format!(
                "{} needs to work harder. Parents are requested to support daily study.",
                first_name
            ),
            Grade::F => format!(
                "{} requires serious attention and extra support to improve.",
                first_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::compute_student_summary;
    use crate::model::ExamType;

    fn fixture() -> (Student, Vec<Subject>, Vec<MarkRecord>) {
        let student = Student {
            id: "demo".into(),
            name: "Rohan Sharma".into(),
            class_name: "Class 10".into(),
            ..Student::default()
        };
        let subjects = vec![Subject {
            id: "1".into(),
            name: "Mathematics".into(),
            class_name: "Class 10".into(),
            max_marks_theory: 80.0,
            max_marks_assessment: 20.0,
        }];
        let marks = vec![
            MarkRecord {
                student_id: "demo".into(),
                subject_id: "1".into(),
                exam_type: ExamType::HalfYearly,
                theory: 70.0,
                assessment: 18.0,
            },
            MarkRecord {
                student_id: "demo".into(),
                subject_id: "gone".into(),
                exam_type: ExamType::Annual,
                theory: 1.0,
                assessment: 1.0,
            },
        ];
        (student, subjects, marks)
    }

    #[test]
    fn performance_summary_lists_known_subjects_only() {
        let (student, subjects, marks) = fixture();
        assert_eq!(
            performance_summary(&student, &subjects, &marks),
            "Student Rohan Sharma marks: Mathematics (HalfYearly): 88. "
        );
    }

    #[test]
    fn template_remark_follows_overall_grade() {
        let (student, subjects, marks) = fixture();
        let summary = compute_student_summary(&student, &subjects, &marks);
        let text = TemplateRemarks.generate(&student, &summary, "");
        assert!(text.starts_with("Rohan needs to work harder"), "{}", text);

        let empty = compute_student_summary(&student, &[], &[]);
        let text = TemplateRemarks.generate(&student, &empty, "");
        assert!(text.contains("no marks recorded"));
    }
}
