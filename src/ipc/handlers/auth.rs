use crate::ipc::helpers::{load_snapshot, optional_str, required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

// Plain trimmed comparison; the stored values are spreadsheet text.
fn credentials_match(stored: &str, given: &str) -> bool {
    stored.trim() == given.trim()
}

fn handle_admin_login(state: &mut AppState, req: &Request) -> HandlerResult {
    let username = optional_str(req, "username").unwrap_or_default();
    let password = optional_str(req, "password").unwrap_or_default();
    let config = load_snapshot(state)?.config;
    let stored_user = config.admin_username.as_deref().unwrap_or("admin");
    let stored_pass = config.admin_password.as_deref().unwrap_or("password");
    if credentials_match(stored_user, &username) && credentials_match(stored_pass, &password) {
        Ok(json!({ "role": "admin" }))
    } else {
        Err(HandlerErr::new("unauthorized", "invalid username or password"))
    }
}

fn handle_teacher_login(state: &mut AppState, req: &Request) -> HandlerResult {
    let teacher_id = required_str(req, "teacherId")?;
    let password = optional_str(req, "password").unwrap_or_default();
    let snapshot = load_snapshot(state)?;
    let teacher = snapshot
        .teachers
        .iter()
        .find(|t| t.id == teacher_id)
        .ok_or_else(|| HandlerErr::not_found("teacher not found"))?;
    if !credentials_match(&teacher.password, &password) {
        return Err(HandlerErr::new("unauthorized", "invalid password"));
    }
    Ok(json!({
        "role": "teacher",
        "teacher": {
            "id": teacher.id,
            "name": teacher.name,
            "assignedClasses": teacher.assigned_classes,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.adminLogin" => handle_admin_login(state, req),
        "auth.teacherLogin" => handle_teacher_login(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
