use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::template;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Planner,
    Editor,
    Organizer,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Planner, Self::Editor, Self::Organizer];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(Self::Planner),
            "editor" => Some(Self::Editor),
            "organizer" => Some(Self::Organizer),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Editor => "editor",
            Self::Organizer => "organizer",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Planner => "setup.planner",
            Self::Editor => "setup.editor",
            Self::Organizer => "setup.organizer",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Planner => json!({
            "newPlanTitle": "Untitled Lesson",
            "defaultDurationMinutes": 60,
            "defaultTemplateId": null
        }),
        SetupSection::Editor => json!({
            "newCellPlaceholder": "New section"
        }),
        SetupSection::Organizer => json!({
            "defaultFolderColor": "#fdba74",
            "trashRetentionDays": 7
        }),
    }
}

/// Workspace defaults consumed by the plan, table and organizer handlers.
#[derive(Clone, Debug)]
pub struct PlannerDefaults {
    pub new_plan_title: String,
    pub default_duration_minutes: i64,
    pub default_template_id: Option<String>,
    pub new_cell_placeholder: String,
    pub default_folder_color: String,
    pub trash_retention_days: i64,
}

pub fn load_planner_defaults(conn: &rusqlite::Connection) -> anyhow::Result<PlannerDefaults> {
    let planner = load_section(conn, SetupSection::Planner)?;
    let editor = load_section(conn, SetupSection::Editor)?;
    let organizer = load_section(conn, SetupSection::Organizer)?;
    let text = |obj: &Value, key: &str, fallback: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };
    Ok(PlannerDefaults {
        new_plan_title: text(&planner, "newPlanTitle", "Untitled Lesson"),
        default_duration_minutes: planner
            .get("defaultDurationMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(60),
        default_template_id: planner
            .get("defaultTemplateId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        new_cell_placeholder: text(&editor, "newCellPlaceholder", "New section"),
        default_folder_color: text(&organizer, "defaultFolderColor", "#fdba74"),
        trash_retention_days: organizer
            .get("trashRetentionDays")
            .and_then(|v| v.as_i64())
            .unwrap_or(7),
    })
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nonempty_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(s)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Planner => match k.as_str() {
                "newPlanTitle" => {
                    obj.insert(k.clone(), Value::String(parse_nonempty_max(v, k, 120)?));
                }
                "defaultDurationMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 600)?));
                }
                "defaultTemplateId" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                        continue;
                    }
                    let id = parse_nonempty_max(v, k, 64)?;
                    if template::find_template(&id).is_none() {
                        return Err(format!("unknown template: {}", id));
                    }
                    obj.insert(k.clone(), Value::String(id));
                }
                _ => return Err(format!("unknown planner field: {}", k)),
            },
            SetupSection::Editor => match k.as_str() {
                "newCellPlaceholder" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 80)?));
                }
                _ => return Err(format!("unknown editor field: {}", k)),
            },
            SetupSection::Organizer => match k.as_str() {
                "defaultFolderColor" => {
                    let color = parse_nonempty_max(v, k, 16)?;
                    if !color.starts_with('#') {
                        return Err("defaultFolderColor must be a #hex color".into());
                    }
                    obj.insert(k.clone(), Value::String(color));
                }
                "trashRetentionDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 365)?));
                }
                _ => return Err(format!("unknown organizer field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults instead of blocking setup.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring stored setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let mut out = Map::new();
    out.insert(section.name().to_string(), current);
    ok(&req.id, Value::Object(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
