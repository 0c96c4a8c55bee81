use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::template::{self, FieldLayout, TemplateField};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

/// Ordered field list from the wire. Unknown names are an error, not skipped.
pub(crate) fn parse_fields(v: Option<&JsonValue>) -> Result<Vec<TemplateField>, String> {
    let Some(raw) = v.filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| "fields must be array of strings".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let name = item
            .as_str()
            .ok_or_else(|| "fields must be array of strings".to_string())?;
        let field =
            TemplateField::parse(name.trim()).ok_or_else(|| format!("unknown field: {}", name))?;
        out.push(field);
    }
    Ok(out)
}

pub(crate) fn parse_field_content(
    v: Option<&JsonValue>,
) -> Result<HashMap<TemplateField, String>, String> {
    let Some(raw) = v.filter(|v| !v.is_null()) else {
        return Ok(HashMap::new());
    };
    let obj = raw
        .as_object()
        .ok_or_else(|| "fieldContent must be an object".to_string())?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let field = TemplateField::parse(k).ok_or_else(|| format!("unknown field: {}", k))?;
        let text = v
            .as_str()
            .ok_or_else(|| format!("fieldContent.{} must be string", k))?;
        out.insert(field, text.to_string());
    }
    Ok(out)
}

fn layout_name(layout: FieldLayout) -> &'static str {
    match layout {
        FieldLayout::Metadata => "metadata",
        FieldLayout::Section => "section",
        FieldLayout::TimedGrid => "timedGrid",
    }
}

fn handle_templates_list(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let templates: Vec<JsonValue> = template::BUILTIN_TEMPLATES
        .iter()
        .map(|t| {
            let mut entry = json!(t);
            entry["rowCount"] = json!(template::build_rows(t.fields, &HashMap::new()).len());
            entry
        })
        .collect();
    ok(&req.id, json!({ "templates": templates }))
}

fn handle_templates_fields(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let fields: Vec<JsonValue> = TemplateField::ALL
        .iter()
        .map(|f| {
            json!({
                "key": f.key(),
                "label": f.label(),
                "hint": f.hint(),
                "layout": layout_name(f.layout()),
            })
        })
        .collect();
    ok(&req.id, json!({ "fields": fields }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.list" => Some(handle_templates_list(state, req)),
        "templates.fields" => Some(handle_templates_fields(state, req)),
        _ => None,
    }
}
