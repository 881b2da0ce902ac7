use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{CollectionUpdate, ExamType, Snapshot};
use serde_json::{Map, Value};
use uuid::Uuid;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub type HandlerResult = Result<Value, HandlerErr>;

pub fn respond(req: &Request, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code, "{}", e.message);
            e.response(&req.id)
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn params_obj(req: &Request) -> Result<&Map<String, Value>, HandlerErr> {
    req.params
        .as_object()
        .ok_or_else(|| HandlerErr::bad_params("params must be an object"))
}

/// Trimmed, non-empty string param. Numbers are accepted as their text form.
pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    optional_str(req, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    let v = req.params.get(key)?;
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn required_obj<'a>(req: &'a Request, key: &str) -> Result<&'a Map<String, Value>, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))
}

/// Numeric field from an object; numeric strings are accepted, blank means absent.
pub fn optional_number(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, HandlerErr> {
    let n = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match n {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn optional_count(obj: &Map<String, Value>, key: &str) -> Result<Option<u32>, HandlerErr> {
    match optional_number(obj, key)? {
        None => Ok(None),
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(Some(v as u32)),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be a non-negative whole number",
            key
        ))),
    }
}

pub fn parse_exam_type(req: &Request) -> Result<ExamType, HandlerErr> {
    let raw = required_str(req, "examType")?;
    ExamType::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("examType must be one of: HalfYearly, Annual")
            .with_details(serde_json::json!({ "examType": raw }))
    })
}

pub fn load_snapshot(state: &AppState) -> Result<Snapshot, HandlerErr> {
    state
        .source
        .fetch_all()
        .map_err(|e| HandlerErr::new("storage_failed", format!("{:#}", e)))
}

pub fn save(state: &mut AppState, update: CollectionUpdate) -> Result<(), HandlerErr> {
    let collection = update.collection();
    state.source.update_collection(update).map_err(|e| {
        let message = format!("{:#}", e);
        let message = if message.contains("database is locked") {
            "Server busy, please try again.".to_string()
        } else {
            message
        };
        HandlerErr::new("storage_failed", message)
            .with_details(serde_json::json!({ "collection": collection.as_str() }))
    })
}
