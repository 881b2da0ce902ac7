use crate::model::{
    dedupe_marks, Attendance, CollectionUpdate, ExamType, MarkRecord, SchoolConfig, Snapshot,
    Student, Subject, Teacher,
};
use crate::store::DataSource;
use anyhow::{anyhow, Context};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE: &str = "reportcard.sqlite3";
const CONFIG_KEY: &str = "school.config";
/// Writers wait this long for the database lock before giving up.
const WRITE_LOCK_WAIT: Duration = Duration::from_secs(45);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(WRITE_LOCK_WAIT)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            sr_no TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            name TEXT NOT NULL,
            father_name TEXT NOT NULL,
            mother_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            mobile TEXT NOT NULL,
            dob TEXT NOT NULL,
            gender TEXT,
            category TEXT,
            admission_date TEXT,
            address TEXT NOT NULL,
            total_days INTEGER NOT NULL DEFAULT 0,
            present_days INTEGER NOT NULL DEFAULT 0,
            remarks TEXT,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password TEXT NOT NULL,
            assigned_classes TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            max_marks_theory REAL NOT NULL,
            max_marks_assessment REAL NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // No foreign keys: orphaned marks are kept and simply never matched.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            theory REAL NOT NULL,
            assessment REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(student_id, subject_id, exam_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text).with_context(|| format!("setting {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
        (key, value.to_string(), chrono::Utc::now().to_rfc3339()),
    )?;
    Ok(())
}

/// Workspace-backed store. Each collection write is one transaction, which
/// serializes writers across processes sharing the workspace.
pub struct SqliteSource {
    conn: Connection,
    workspace: PathBuf,
}

impl SqliteSource {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = open_db(workspace)?;
        Ok(Self {
            conn,
            workspace: workspace.to_path_buf(),
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

fn load_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, sr_no, roll_no, name, father_name, mother_name, class_name, mobile, dob,
                gender, category, admission_date, address, total_days, present_days, remarks
         FROM students
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                sr_no: r.get(1)?,
                roll_no: r.get(2)?,
                name: r.get(3)?,
                father_name: r.get(4)?,
                mother_name: r.get(5)?,
                class_name: r.get(6)?,
                mobile: r.get(7)?,
                dob: r.get(8)?,
                gender: r.get(9)?,
                category: r.get(10)?,
                admission_date: r.get(11)?,
                address: r.get(12)?,
                attendance: Attendance {
                    total_days: r.get(13)?,
                    present_days: r.get(14)?,
                },
                remarks: r.get(15)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_teachers(conn: &Connection) -> anyhow::Result<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, password, assigned_classes FROM teachers ORDER BY sort_order",
    )?;
    let raw = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(id, name, password, classes_json)| {
            let assigned_classes: Vec<String> = serde_json::from_str(&classes_json)
                .with_context(|| format!("teacher {} has malformed assigned_classes", id))?;
            Ok(Teacher {
                id,
                name,
                password,
                assigned_classes,
            })
        })
        .collect()
}

fn load_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_name, max_marks_theory, max_marks_assessment
         FROM subjects
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                class_name: r.get(2)?,
                max_marks_theory: r.get(3)?,
                max_marks_assessment: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_marks(conn: &Connection) -> anyhow::Result<Vec<MarkRecord>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id, exam_type, theory, assessment
         FROM marks
         ORDER BY sort_order",
    )?;
    let raw = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, f64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(student_id, subject_id, exam, theory, assessment)| {
            let exam_type = ExamType::parse(&exam)
                .ok_or_else(|| anyhow!("unknown exam_type in marks table: {}", exam))?;
            Ok(MarkRecord {
                student_id,
                subject_id,
                exam_type,
                theory,
                assessment,
            })
        })
        .collect()
}

fn save_students(tx: &Transaction, rows: &[Student]) -> anyhow::Result<()> {
    tx.execute("DELETE FROM students", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO students(
            id, sr_no, roll_no, name, father_name, mother_name, class_name, mobile, dob,
            gender, category, admission_date, address, total_days, present_days, remarks, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (i, s) in rows.iter().enumerate() {
        stmt.execute(params![
            s.id,
            s.sr_no,
            s.roll_no,
            s.name,
            s.father_name,
            s.mother_name,
            s.class_name,
            s.mobile,
            s.dob,
            s.gender,
            s.category,
            s.admission_date,
            s.address,
            s.attendance.total_days,
            s.attendance.present_days,
            s.remarks,
            i as i64
        ])
        .with_context(|| format!("failed to save student {}", s.id))?;
    }
    Ok(())
}

fn save_teachers(tx: &Transaction, rows: &[Teacher]) -> anyhow::Result<()> {
    tx.execute("DELETE FROM teachers", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO teachers(id, name, password, assigned_classes, sort_order)
         VALUES(?, ?, ?, ?, ?)",
    )?;
    for (i, t) in rows.iter().enumerate() {
        let classes = serde_json::to_string(&t.assigned_classes)?;
        stmt.execute(params![t.id, t.name, t.password, classes, i as i64])
            .with_context(|| format!("failed to save teacher {}", t.id))?;
    }
    Ok(())
}

fn save_subjects(tx: &Transaction, rows: &[Subject]) -> anyhow::Result<()> {
    tx.execute("DELETE FROM subjects", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO subjects(id, name, class_name, max_marks_theory, max_marks_assessment, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (i, s) in rows.iter().enumerate() {
        stmt.execute(params![
            s.id,
            s.name,
            s.class_name,
            s.max_marks_theory,
            s.max_marks_assessment,
            i as i64
        ])
        .with_context(|| format!("failed to save subject {}", s.id))?;
    }
    Ok(())
}

fn save_marks(tx: &Transaction, rows: Vec<MarkRecord>) -> anyhow::Result<()> {
    tx.execute("DELETE FROM marks", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO marks(student_id, subject_id, exam_type, theory, assessment, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (i, m) in dedupe_marks(rows).iter().enumerate() {
        stmt.execute(params![
            m.student_id,
            m.subject_id,
            m.exam_type.as_str(),
            m.theory,
            m.assessment,
            i as i64
        ])?;
    }
    Ok(())
}

impl DataSource for SqliteSource {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn fetch_all(&self) -> anyhow::Result<Snapshot> {
        let stored = settings_get_json(&self.conn, CONFIG_KEY)?;
        Ok(Snapshot {
            students: load_students(&self.conn).context("failed to load students")?,
            teachers: load_teachers(&self.conn).context("failed to load teachers")?,
            subjects: load_subjects(&self.conn).context("failed to load subjects")?,
            marks: load_marks(&self.conn).context("failed to load marks")?,
            config: SchoolConfig::from_stored(stored.as_ref())?,
        })
    }

    fn update_collection(&mut self, update: CollectionUpdate) -> anyhow::Result<()> {
        update.check_ids()?;
        let collection = update.collection();
        let tx = self.conn.transaction()?;
        match update {
            CollectionUpdate::Students(rows) => save_students(&tx, &rows)?,
            CollectionUpdate::Teachers(rows) => save_teachers(&tx, &rows)?,
            CollectionUpdate::Subjects(rows) => save_subjects(&tx, &rows)?,
            CollectionUpdate::Marks(rows) => save_marks(&tx, rows)?,
            CollectionUpdate::Config(cfg) => {
                settings_set_json(&tx, CONFIG_KEY, &serde_json::to_value(&cfg)?)?
            }
        }
        tx.commit()
            .with_context(|| format!("failed to commit {}", collection.as_str()))?;
        Ok(())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        for table in ["students", "teachers", "subjects", "marks"] {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        tx.execute("DELETE FROM settings WHERE key = ?", [CONFIG_KEY])?;
        tx.commit()?;
        Ok(())
    }
}
