use crate::model::{ExamType, MarkRecord, Student, Subject};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// 1-decimal rounding used for display: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Fixed-point display string, e.g. `format_fixed(88.0, 2) == "88.00"`.
/// Exact halves round away from zero (`92.25` -> `"92.3"`), unlike `{:.N}`.
pub fn format_fixed(x: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    format!("{:.*}", decimals, (x * scale).round() / scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const GRADE_TIERS: [(f64, Grade); 6] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::C),
    (33.0, Grade::D),
];

/// Ordered thresholds, lower bound inclusive. Values above 100 land in A+;
/// marks are bounded by their subject maxima so that is not reachable from
/// well-formed input.
pub fn letter_grade(percentage: f64) -> Grade {
    GRADE_TIERS
        .iter()
        .find(|(min, _)| percentage >= *min)
        .map(|(_, g)| *g)
        .unwrap_or(Grade::F)
}

fn ratio_percent(obtained: f64, max: f64) -> f64 {
    if max > 0.0 {
        (obtained / max) * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamBreakdown {
    pub theory: f64,
    pub assessment: f64,
    pub total: f64,
}

impl ExamBreakdown {
    fn from_record(record: Option<&MarkRecord>) -> Self {
        let (theory, assessment) = record
            .map(|m| (m.theory, m.assessment))
            .unwrap_or((0.0, 0.0));
        Self {
            theory,
            assessment,
            total: theory + assessment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: String,
    pub subject_name: String,
    pub max_marks_theory: f64,
    pub max_marks_assessment: f64,
    pub half_yearly: ExamBreakdown,
    pub annual: ExamBreakdown,
    pub grand_total: f64,
    pub max_total: f64,
    pub percentage: f64,
    pub grade: Grade,
}

/// First record wins if the key is ever duplicated upstream.
fn find_mark<'a>(
    marks: &'a [MarkRecord],
    student_id: &str,
    subject_id: &str,
    exam_type: ExamType,
) -> Option<&'a MarkRecord> {
    marks
        .iter()
        .find(|m| m.key_matches(student_id, subject_id, exam_type))
}

/// A missing exam record scores zero for that exam; it is never an error.
pub fn compute_subject_result(
    student: &Student,
    subject: &Subject,
    marks: &[MarkRecord],
) -> SubjectResult {
    let half_yearly = ExamBreakdown::from_record(find_mark(
        marks,
        &student.id,
        &subject.id,
        ExamType::HalfYearly,
    ));
    let annual = ExamBreakdown::from_record(find_mark(
        marks,
        &student.id,
        &subject.id,
        ExamType::Annual,
    ));

    let grand_total = half_yearly.total + annual.total;
    let max_total = (subject.max_marks_theory + subject.max_marks_assessment) * 2.0;
    let percentage = ratio_percent(grand_total, max_total);

    SubjectResult {
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        max_marks_theory: subject.max_marks_theory,
        max_marks_assessment: subject.max_marks_assessment,
        half_yearly,
        annual,
        grand_total,
        max_total,
        percentage,
        grade: letter_grade(percentage),
    }
}

pub fn attendance_percentage(student: &Student) -> f64 {
    let a = student.attendance;
    ratio_percent(a.present_days as f64, a.total_days as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub class_name: String,
    pub subjects: Vec<SubjectResult>,
    pub total_obtained: f64,
    pub total_max: f64,
    pub percentage: f64,
    pub grade: Grade,
    /// Unrounded; comparisons use this value.
    pub attendance_percentage: f64,
    /// One decimal place, display only.
    pub attendance_display: f64,
}

impl StudentSummary {
    /// Zero percentage is the "no academic data" sentinel.
    pub fn has_marks(&self) -> bool {
        self.percentage > 0.0
    }
}

/// Subjects from other classes are skipped, so callers may pass the full list.
pub fn compute_student_summary(
    student: &Student,
    subjects: &[Subject],
    marks: &[MarkRecord],
) -> StudentSummary {
    let results: Vec<SubjectResult> = subjects
        .iter()
        .filter(|s| s.class_name == student.class_name)
        .map(|s| compute_subject_result(student, s, marks))
        .collect();

    let total_obtained: f64 = results.iter().map(|r| r.grand_total).sum();
    let total_max: f64 = results.iter().map(|r| r.max_total).sum();
    let percentage = ratio_percent(total_obtained, total_max);
    let attendance = attendance_percentage(student);

    StudentSummary {
        student_id: student.id.clone(),
        name: student.name.clone(),
        roll_no: student.roll_no.clone(),
        class_name: student.class_name.clone(),
        subjects: results,
        total_obtained,
        total_max,
        percentage,
        grade: letter_grade(percentage),
        attendance_percentage: attendance,
        attendance_display: round_off_1_decimal(attendance),
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Highest by `key`; the earliest element wins a tie.
fn first_max<'a, F>(items: impl IntoIterator<Item = &'a StudentSummary>, key: F) -> Option<&'a StudentSummary>
where
    F: Fn(&StudentSummary) -> f64,
{
    let mut best: Option<&StudentSummary> = None;
    for s in items {
        match best {
            Some(b) if key(s) <= key(b) => {}
            _ => best = Some(s),
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRanking {
    pub class_name: String,
    /// Every student of the class in input order, including zero-data ones.
    pub members: Vec<StudentSummary>,
    pub top3: Vec<StudentSummary>,
    pub best_attendance: Option<StudentSummary>,
}

pub fn rank_class(
    class_name: &str,
    students: &[Student],
    subjects: &[Subject],
    marks: &[MarkRecord],
) -> ClassRanking {
    let members: Vec<StudentSummary> = students
        .iter()
        .filter(|s| s.class_name == class_name)
        .map(|s| compute_student_summary(s, subjects, marks))
        .collect();

    let mut sorted: Vec<&StudentSummary> = members.iter().collect();
    // Vec::sort_by is stable; equal percentages keep input order.
    sorted.sort_by(|a, b| desc(a.percentage, b.percentage));
    let top3 = sorted.into_iter().take(3).cloned().collect();

    let best_attendance = first_max(&members, |s| s.attendance_percentage).cloned();

    ClassRanking {
        class_name: class_name.to_string(),
        members,
        top3,
        best_attendance,
    }
}

/// Rankings for every class in `class_order` that has at least one student.
pub fn rank_classes(
    class_order: &[String],
    students: &[Student],
    subjects: &[Subject],
    marks: &[MarkRecord],
) -> Vec<ClassRanking> {
    class_order
        .iter()
        .map(|c| rank_class(c, students, subjects, marks))
        .filter(|r| !r.members.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSummary {
    pub school_topper: Option<StudentSummary>,
    pub school_attendance_leader: Option<StudentSummary>,
}

/// School-wide titles over every student in input order. Only students with
/// academic data qualify. The topper is the first highest percentage; the
/// attendance leader is taken from that percentage ranking, so an attendance
/// tie goes to the higher percentage, then to the earlier student.
pub fn rank_school(
    students: &[Student],
    subjects: &[Subject],
    marks: &[MarkRecord],
) -> SchoolSummary {
    let mut qualified: Vec<StudentSummary> = students
        .iter()
        .map(|s| compute_student_summary(s, subjects, marks))
        .filter(|s| s.has_marks())
        .collect();

    qualified.sort_by(|a, b| desc(a.percentage, b.percentage));
    let school_topper = qualified.first().cloned();
    qualified.sort_by(|a, b| desc(a.attendance_percentage, b.attendance_percentage));
    let school_attendance_leader = qualified.into_iter().next();

    SchoolSummary {
        school_topper,
        school_attendance_leader,
    }
}
