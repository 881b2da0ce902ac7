use crate::ipc::helpers::{
    load_snapshot, optional_count, params_obj, required_obj, respond, save, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    template_name, CollectionUpdate, SchoolConfig, TemplatePreferences, TEMPLATE_IDS,
};
use serde_json::{json, Map, Value};

fn config_json(config: &SchoolConfig) -> Result<Value, HandlerErr> {
    let mut v = serde_json::to_value(config)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    if let Some(obj) = v.as_object_mut() {
        obj.remove("adminPassword");
    }
    Ok(v)
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s))
}

fn merge_config_patch(current: &mut Map<String, Value>, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let s = parse_string_max(v, k, 200)?;
                if s.is_empty() {
                    return Err("name must not be empty".into());
                }
                current.insert(k.clone(), Value::String(s));
            }
            "address" | "logoUrl" | "developerName" => {
                current.insert(k.clone(), Value::String(parse_string_max(v, k, 2000)?));
            }
            "adminUsername" | "adminPassword" => {
                let s = parse_string_max(v, k, 200)?;
                if s.is_empty() {
                    return Err(format!("{} must not be empty", k));
                }
                current.insert(k.clone(), Value::String(s));
            }
            "googleWebAppUrl" | "sessionYear" => {
                current.insert(k.clone(), parse_nullable_string_max(v, k, 2000)?);
            }
            "isResultsPublished" => {
                current.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            "activeTemplate" => {
                let id = v
                    .as_u64()
                    .filter(|id| TEMPLATE_IDS.contains(&(*id as u32)))
                    .ok_or_else(|| "activeTemplate must be in 1..=6".to_string())?;
                current.insert(k.clone(), Value::from(id));
            }
            _ => return Err(format!("unknown config field: {}", k)),
        }
    }
    Ok(())
}

fn handle_config_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    Ok(json!({ "config": config_json(&snapshot.config)? }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let patch = required_obj(req, "patch")?;
    let snapshot = load_snapshot(state)?;
    let mut current = serde_json::to_value(&snapshot.config)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    let Some(obj) = current.as_object_mut() else {
        return Err(HandlerErr::new("storage_failed", "config is not an object"));
    };
    merge_config_patch(obj, patch).map_err(HandlerErr::bad_params)?;
    let next = SchoolConfig::from_stored(Some(&current))
        .map_err(|e| HandlerErr::bad_params(format!("invalid config: {}", e)))?;

    save(state, CollectionUpdate::Config(next.clone()))?;
    Ok(json!({ "config": config_json(&next)? }))
}

/// Merges a patch into one template's saved overrides. `null` clears a field.
fn handle_set_template_preferences(state: &mut AppState, req: &Request) -> HandlerResult {
    let template_id = optional_count(params_obj(req)?, "templateId")?
        .ok_or_else(|| HandlerErr::bad_params("missing templateId"))?;
    if !TEMPLATE_IDS.contains(&template_id) {
        return Err(HandlerErr::bad_params("templateId must be in 1..=6")
            .with_details(json!({ "templateId": template_id })));
    }
    let patch = required_obj(req, "patch")?;

    let mut snapshot = load_snapshot(state)?;
    let mut prefs_map = snapshot.config.template_preferences.take().unwrap_or_default();
    let current = prefs_map.remove(&template_id).unwrap_or_default();
    let mut merged = serde_json::to_value(&current)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in patch {
            if v.is_null() {
                obj.remove(k);
            } else {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    let next: TemplatePreferences = serde_json::from_value(merged)
        .map_err(|e| HandlerErr::bad_params(format!("invalid template preferences: {}", e)))?;
    if next != TemplatePreferences::default() {
        prefs_map.insert(template_id, next);
    }
    snapshot.config.template_preferences = if prefs_map.is_empty() {
        None
    } else {
        Some(prefs_map)
    };
    let theme = snapshot.config.resolved_theme(template_id);

    save(state, CollectionUpdate::Config(snapshot.config))?;
    Ok(json!({
        "templateId": template_id,
        "templateName": template_name(template_id),
        "theme": theme
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "config.get" => handle_config_get(state, req),
        "config.update" => handle_config_update(state, req),
        "config.setTemplatePreferences" => handle_set_template_preferences(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_patch_rejects_unknown_and_bad_template() {
        let mut current = Map::new();
        let mut patch = Map::new();
        patch.insert("activeTemplate".into(), json!(7));
        assert!(merge_config_patch(&mut current, &patch).is_err());

        let mut patch = Map::new();
        patch.insert("motto".into(), json!("learn"));
        assert!(merge_config_patch(&mut current, &patch).is_err());

        let mut patch = Map::new();
        patch.insert("activeTemplate".into(), json!(6));
        patch.insert("sessionYear".into(), json!("  "));
        patch.insert("isResultsPublished".into(), json!(false));
        merge_config_patch(&mut current, &patch).expect("valid patch");
        assert_eq!(current.get("activeTemplate"), Some(&json!(6)));
        assert_eq!(current.get("sessionYear"), Some(&Value::Null));
        assert_eq!(current.get("isResultsPublished"), Some(&json!(false)));
    }
}
