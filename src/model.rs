use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Grade levels in merit-list order. Class names are otherwise opaque strings.
pub const CLASS_LEVELS: [&str; 20] = [
    "Play Group",
    "Nursery",
    "LKG",
    "UKG",
    "Class 1",
    "Class 2",
    "Class 3",
    "Class 4",
    "Class 5",
    "Class 6",
    "Class 7",
    "Class 8",
    "Class 9",
    "Class 10",
    "Class 11 Arts",
    "Class 11 Comm",
    "Class 11 Sci",
    "Class 12 Arts",
    "Class 12 Comm",
    "Class 12 Sci",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamType {
    HalfYearly,
    Annual,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::HalfYearly => "HalfYearly",
            ExamType::Annual => "Annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "HalfYearly" => Some(ExamType::HalfYearly),
            "Annual" => Some(ExamType::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_days: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub present_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sr_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub roll_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub father_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mother_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dob: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub gender: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub category: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub admission_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_attendance")]
    pub attendance: Attendance,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub assigned_classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_marks_theory: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_marks_assessment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub student_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub subject_id: String,
    pub exam_type: ExamType,
    #[serde(default, deserialize_with = "lenient_number")]
    pub theory: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub assessment: f64,
}

impl MarkRecord {
    pub fn key_matches(&self, student_id: &str, subject_id: &str, exam_type: ExamType) -> bool {
        self.student_id == student_id && self.subject_id == subject_id && self.exam_type == exam_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    Sans,
    Serif,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderStyle {
    Standard,
    Modern,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStyle {
    Striped,
    Grid,
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    Classic,
    Rounded,
    None,
}

/// Fully resolved visual theme for one report-card template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOptions {
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: FontFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_style: Option<HeaderStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_style: Option<TableStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_style: Option<BorderStyle>,
    pub show_watermark: bool,
}

/// Saved per-template overrides; unset fields fall back to the template default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<FontFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_style: Option<HeaderStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_style: Option<TableStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_style: Option<BorderStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_watermark: Option<bool>,
}

pub const TEMPLATE_IDS: std::ops::RangeInclusive<u32> = 1..=6;

fn theme(primary: &str, secondary: &str, font_family: FontFamily) -> TemplateOptions {
    TemplateOptions {
        primary_color: primary.to_string(),
        secondary_color: secondary.to_string(),
        font_family,
        header_style: None,
        table_style: None,
        border_style: None,
        show_watermark: false,
    }
}

/// Built-in theme for a template id; unknown ids use the classic template.
pub fn default_theme(template_id: u32) -> TemplateOptions {
    match template_id {
        2 => theme("#4338ca", "#3730a3", FontFamily::Sans),
        3 => theme("#111827", "#d1d5db", FontFamily::Sans),
        4 => theme("#7c2d12", "#fed7aa", FontFamily::Serif),
        5 => theme("#1e3a8a", "#2563eb", FontFamily::Sans),
        6 => TemplateOptions {
            header_style: Some(HeaderStyle::Standard),
            table_style: Some(TableStyle::Grid),
            border_style: Some(BorderStyle::Classic),
            ..theme("#000000", "#666666", FontFamily::Sans)
        },
        _ => theme("#1f2937", "#4b5563", FontFamily::Serif),
    }
}

pub fn template_name(template_id: u32) -> &'static str {
    match template_id {
        2 => "modern",
        3 => "professional",
        4 => "elegant",
        5 => "corporate",
        6 => "custom",
        _ => "classic",
    }
}

impl TemplatePreferences {
    pub fn apply_to(&self, mut base: TemplateOptions) -> TemplateOptions {
        if let Some(v) = &self.primary_color {
            base.primary_color = v.clone();
        }
        if let Some(v) = &self.secondary_color {
            base.secondary_color = v.clone();
        }
        if let Some(v) = self.font_family {
            base.font_family = v;
        }
        if self.header_style.is_some() {
            base.header_style = self.header_style;
        }
        if self.table_style.is_some() {
            base.table_style = self.table_style;
        }
        if self.border_style.is_some() {
            base.border_style = self.border_style;
        }
        if let Some(v) = self.show_watermark {
            base.show_watermark = v;
        }
        base
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logo_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub developer_name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub admin_username: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub admin_password: Option<String>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub is_results_published: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub google_web_app_url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub session_year: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_count"
    )]
    pub active_template: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_template_preferences"
    )]
    pub template_preferences: Option<BTreeMap<u32, TemplatePreferences>>,
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            name: "Gyan Ganga Vidhya Mandir".to_string(),
            address: "Vidhya Nagar, Sector 4, India".to_string(),
            logo_url: String::new(),
            developer_name: "Aapbiti News by SRM".to_string(),
            admin_username: Some("admin".to_string()),
            admin_password: Some("password".to_string()),
            is_results_published: true,
            google_web_app_url: None,
            session_year: None,
            active_template: None,
            template_preferences: None,
        }
    }
}

impl SchoolConfig {
    /// Overlays a stored (possibly partial) config object on the defaults.
    pub fn from_stored(stored: Option<&Value>) -> anyhow::Result<Self> {
        let mut merged = serde_json::to_value(SchoolConfig::default())?;
        if let (Some(Value::Object(saved)), Some(base)) = (stored, merged.as_object_mut()) {
            for (k, v) in saved {
                if !v.is_null() {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn active_template_id(&self) -> u32 {
        match self.active_template {
            Some(id) if TEMPLATE_IDS.contains(&id) => id,
            _ => 1,
        }
    }

    pub fn resolved_theme(&self, template_id: u32) -> TemplateOptions {
        let id = if TEMPLATE_IDS.contains(&template_id) {
            template_id
        } else {
            1
        };
        let base = default_theme(id);
        match self
            .template_preferences
            .as_ref()
            .and_then(|prefs| prefs.get(&id))
        {
            Some(p) => p.apply_to(base),
            None => base,
        }
    }

    pub fn session_label(&self, current_year: i32) -> String {
        match self.session_year.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("{}-{}", current_year, current_year + 1),
        }
    }
}

/// All collections as one owned, immutable-by-convention copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub teachers: Vec<Teacher>,
    pub subjects: Vec<Subject>,
    pub marks: Vec<MarkRecord>,
    pub config: SchoolConfig,
}

impl Snapshot {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Known grade levels first, then any other class names in first-seen order.
    pub fn class_order(&self) -> Vec<String> {
        let mut out: Vec<String> = CLASS_LEVELS.iter().map(|c| c.to_string()).collect();
        for s in &self.students {
            if !out.iter().any(|c| c == &s.class_name) {
                out.push(s.class_name.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Students,
    Teachers,
    Subjects,
    Marks,
    Config,
}

impl Collection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Students" => Some(Collection::Students),
            "Teachers" => Some(Collection::Teachers),
            "Subjects" => Some(Collection::Subjects),
            "Marks" => Some(Collection::Marks),
            "Config" => Some(Collection::Config),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Students => "Students",
            Collection::Teachers => "Teachers",
            Collection::Subjects => "Subjects",
            Collection::Marks => "Marks",
            Collection::Config => "Config",
        }
    }
}

/// Whole-collection replacement.
#[derive(Debug, Clone)]
pub enum CollectionUpdate {
    Students(Vec<Student>),
    Teachers(Vec<Teacher>),
    Subjects(Vec<Subject>),
    Marks(Vec<MarkRecord>),
    Config(SchoolConfig),
}

impl CollectionUpdate {
    pub fn collection(&self) -> Collection {
        match self {
            CollectionUpdate::Students(_) => Collection::Students,
            CollectionUpdate::Teachers(_) => Collection::Teachers,
            CollectionUpdate::Subjects(_) => Collection::Subjects,
            CollectionUpdate::Marks(_) => Collection::Marks,
            CollectionUpdate::Config(_) => Collection::Config,
        }
    }

    /// Record ids must be non-blank and unique within their collection.
    pub fn check_ids(&self) -> anyhow::Result<()> {
        let ids: Vec<&str> = match self {
            CollectionUpdate::Students(rows) => rows.iter().map(|r| r.id.as_str()).collect(),
            CollectionUpdate::Teachers(rows) => rows.iter().map(|r| r.id.as_str()).collect(),
            CollectionUpdate::Subjects(rows) => rows.iter().map(|r| r.id.as_str()).collect(),
            CollectionUpdate::Marks(_) | CollectionUpdate::Config(_) => return Ok(()),
        };
        let mut seen = std::collections::HashSet::new();
        for (i, id) in ids.into_iter().enumerate() {
            if id.trim().is_empty() {
                anyhow::bail!("row {}: id is blank", i + 1);
            }
            if !seen.insert(id) {
                anyhow::bail!("row {}: duplicate id {}", i + 1, id);
            }
        }
        Ok(())
    }

    /// Decodes a raw `data` array for one collection. `Config` takes the first element.
    pub fn decode(collection: Collection, data: Value) -> anyhow::Result<Self> {
        let data = unwrap_json_text(data);
        let rows = match data {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(match collection {
            Collection::Students => CollectionUpdate::Students(decode_rows(rows)?),
            Collection::Teachers => CollectionUpdate::Teachers(decode_rows(rows)?),
            Collection::Subjects => CollectionUpdate::Subjects(decode_rows(rows)?),
            Collection::Marks => CollectionUpdate::Marks(decode_rows(rows)?),
            Collection::Config => {
                CollectionUpdate::Config(SchoolConfig::from_stored(rows.first())?)
            }
        })
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> anyhow::Result<Vec<T>> {
    rows.into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value(v).map_err(|e| anyhow::anyhow!("row {}: {}", i + 1, e))
        })
        .collect()
}

/// Keeps the first record for each (studentId, subjectId, examType).
pub fn dedupe_marks(marks: Vec<MarkRecord>) -> Vec<MarkRecord> {
    let mut seen = std::collections::HashSet::new();
    marks
        .into_iter()
        .filter(|m| seen.insert((m.student_id.clone(), m.subject_id.clone(), m.exam_type)))
        .collect()
}

// Spreadsheet cells come back loosely typed; nested values may be JSON text.

fn unwrap_json_text(v: Value) -> Value {
    if let Value::String(s) = &v {
        let t = s.trim();
        if t.starts_with('{') || t.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(t) {
                return parsed;
            }
        }
    }
    v
}

fn value_to_string(v: Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn value_to_number(v: &Value) -> f64 {
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let s = value_to_string(Value::deserialize(d)?);
    Ok(if s.trim().is_empty() { None } else { Some(s) })
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(value_to_number(&Value::deserialize(d)?))
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = value_to_number(&Value::deserialize(d)?);
    Ok(if n > 0.0 { n.round().min(u32::MAX as f64) as u32 } else { 0 })
}

fn lenient_opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let v = Value::deserialize(d)?;
    if v.is_null() || v.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
        return Ok(None);
    }
    let n = value_to_number(&v);
    Ok(if n > 0.0 { Some(n.round() as u32) } else { None })
}

fn default_true() -> bool {
    true
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | ""),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    })
}

fn lenient_string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match unwrap_json_text(Value::deserialize(d)?) {
        Value::Array(items) => items
            .into_iter()
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_attendance<'de, D: Deserializer<'de>>(d: D) -> Result<Attendance, D::Error> {
    match unwrap_json_text(Value::deserialize(d)?) {
        v @ Value::Object(_) => serde_json::from_value(v).map_err(serde::de::Error::custom),
        _ => Ok(Attendance::default()),
    }
}

fn lenient_template_preferences<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<BTreeMap<u32, TemplatePreferences>>, D::Error> {
    match unwrap_json_text(Value::deserialize(d)?) {
        v @ Value::Object(_) => serde_json::from_value(v)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
