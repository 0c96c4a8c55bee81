use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_planner_defaults;
use crate::ipc::handlers::templates::{parse_field_content, parse_fields};
use crate::ipc::helpers::{
    db_conn, no_workspace, now_ts, parse_bool, parse_opt_i64, parse_opt_string, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::table::Table;
use crate::template;
use crate::workspace;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

const PLAN_COLUMNS: &str = "id, class_id, folder_id, title, grade, subject, topic, duration_minutes,
     template_id, created_at, updated_at, deleted_at, json_array_length(table_json)";

fn plan_json(r: &rusqlite::Row) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classId": r.get::<_, Option<String>>(1)?,
        "folderId": r.get::<_, Option<String>>(2)?,
        "title": r.get::<_, String>(3)?,
        "grade": r.get::<_, String>(4)?,
        "subject": r.get::<_, String>(5)?,
        "topic": r.get::<_, String>(6)?,
        "durationMinutes": r.get::<_, i64>(7)?,
        "templateId": r.get::<_, Option<String>>(8)?,
        "createdAt": r.get::<_, String>(9)?,
        "updatedAt": r.get::<_, String>(10)?,
        "deletedAt": r.get::<_, Option<String>>(11)?,
        "rowCount": r.get::<_, Option<i64>>(12)?.unwrap_or(0),
    }))
}

fn plan_summary(conn: &Connection, plan_id: &str) -> rusqlite::Result<Option<JsonValue>> {
    conn.query_row(
        &format!("SELECT {} FROM plans WHERE id = ?", PLAN_COLUMNS),
        [plan_id],
        plan_json,
    )
    .optional()
}

fn plan_is_live(conn: &Connection, plan_id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM plans WHERE id = ? AND deleted_at IS NULL",
            [plan_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Validates a class/folder target and fills in the class from the folder when omitted.
pub(crate) fn resolve_placement(
    conn: &Connection,
    class_id: Option<String>,
    folder_id: Option<String>,
) -> Result<(Option<String>, Option<String>), (&'static str, String)> {
    let db_err = |e: anyhow::Error| ("db_query_failed", e.to_string());
    let mut class_id = class_id;
    if let Some(fid) = folder_id.as_deref() {
        let folder = workspace::folder_ref(conn, fid).map_err(db_err)?;
        match folder {
            Some(f) if f.is_live() => {
                if class_id.is_none() {
                    class_id = Some(f.class_id);
                } else if class_id.as_deref() != Some(f.class_id.as_str()) {
                    return Err(("bad_params", "folder belongs to another class".to_string()));
                }
            }
            _ => return Err(("not_found", "folder not found".to_string())),
        }
    }
    if let Some(cid) = class_id.as_deref() {
        match workspace::class_is_live(conn, cid).map_err(db_err)? {
            Some(true) => {}
            _ => return Err(("not_found", "class not found".to_string())),
        }
    }
    Ok((class_id, folder_id))
}

/// Current plan id, falling back to the most recently edited live plan when the designated
/// one has been trashed or deleted.
fn resolve_current(state: &mut AppState) -> anyhow::Result<Option<String>> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(None);
    };
    if let Some(id) = state.current_plan_id.as_deref() {
        if plan_is_live(conn, id)? {
            return Ok(Some(id.to_string()));
        }
        let fallback = workspace::latest_live_plan(conn)?;
        state.current_plan_id = fallback.clone();
        return Ok(fallback);
    }
    Ok(None)
}

fn handle_plans_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let include_deleted = match parse_bool(req.params.get("includeDeleted"), false) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("includeDeleted {}", m), None),
    };
    let class_id = match parse_opt_string(req.params.get("classId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("classId {}", m), None),
    };
    let folder_id = match parse_opt_string(req.params.get("folderId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("folderId {}", m), None),
    };

    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if !include_deleted {
        clauses.push("deleted_at IS NULL");
    }
    if let Some(c) = class_id {
        clauses.push("class_id = ?");
        args.push(c);
    }
    if let Some(f) = folder_id {
        clauses.push("folder_id = ?");
        args.push(f);
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM plans {} ORDER BY updated_at DESC, id",
        PLAN_COLUMNS, where_sql
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let plans = stmt
        .query_map(params_from_iter(args.iter()), plan_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match plans {
        Ok(plans) => ok(&req.id, json!({ "plans": plans })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_plans_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let defaults = match load_planner_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut text: [Option<String>; 7] = Default::default();
    let keys = ["title", "grade", "subject", "topic", "classId", "folderId", "templateId"];
    for (slot, key) in text.iter_mut().zip(keys) {
        match parse_opt_string(req.params.get(key)) {
            Ok(v) => *slot = v,
            Err(m) => return err(&req.id, "bad_params", format!("{} {}", key, m), None),
        }
    }
    let [title, grade, subject, topic, class_id, folder_id, explicit_template] = text;
    let title = title.unwrap_or_else(|| defaults.new_plan_title.clone());
    let grade = grade.unwrap_or_default();
    let subject = subject.unwrap_or_default();
    let topic = topic.unwrap_or_default();

    let duration = match parse_opt_i64(req.params.get("durationMinutes")) {
        Ok(Some(v)) if v > 0 => v,
        Ok(Some(_)) => {
            return err(&req.id, "bad_params", "durationMinutes must be positive", None)
        }
        Ok(None) => defaults.default_duration_minutes,
        Err(m) => return err(&req.id, "bad_params", format!("durationMinutes {}", m), None),
    };
    let fields = match parse_fields(req.params.get("fields")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let prefill = match parse_field_content(req.params.get("fieldContent")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    if explicit_template.is_some() && !fields.is_empty() {
        return err(&req.id, "bad_params", "pass templateId or fields, not both", None);
    }
    let template = match explicit_template.as_deref() {
        Some(id) => match template::find_template(id) {
            Some(t) => Some(t),
            None => return err(&req.id, "bad_params", format!("unknown template: {}", id), None),
        },
        None => defaults
            .default_template_id
            .as_deref()
            .and_then(template::find_template),
    };
    let (table, template_id) = if !fields.is_empty() {
        (Table::from_specs(template::build_rows(&fields, &prefill)), None)
    } else if let Some(t) = template {
        (
            Table::from_specs(template::build_rows(t.fields, &prefill)),
            Some(t.id.to_string()),
        )
    } else {
        (Table::from_specs(template::default_layout()), None)
    };

    let (class_id, folder_id) = match resolve_placement(conn, class_id, folder_id) {
        Ok(v) => v,
        Err((code, msg)) => return err(&req.id, code, msg, None),
    };

    let table_json = match serde_json::to_string(&table) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    let plan_id = Uuid::new_v4().to_string();
    let now = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO plans(id, class_id, folder_id, title, grade, subject, topic, duration_minutes,
                           template_id, table_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            plan_id,
            class_id,
            folder_id,
            title,
            grade,
            subject,
            topic,
            duration,
            template_id,
            table_json,
            now,
            now
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "plans" })),
        );
    }

    let summary = match plan_summary(conn, &plan_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    state.current_plan_id = Some(plan_id.clone());
    ok(
        &req.id,
        json!({ "planId": plan_id, "plan": summary, "tableContent": table }),
    )
}

fn handle_plans_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let row = conn
        .query_row(
            &format!("SELECT {}, table_json FROM plans WHERE id = ?", PLAN_COLUMNS),
            [&plan_id],
            |r| Ok((plan_json(r)?, r.get::<_, String>(13)?)),
        )
        .optional();
    let (mut plan, raw_table) = match row {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "plan not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let table: Table = match serde_json::from_str(&raw_table) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "corrupt_table", e.to_string(), None),
    };
    plan["tableContent"] = json!(table);
    ok(&req.id, json!({ "plan": plan }))
}

fn handle_plans_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut sets: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "title" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "title must be a non-empty string", None);
                };
                sets.push("title = ?");
                args.push(Value::Text(s.to_string()));
            }
            "grade" | "subject" | "topic" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", format!("{} must be string", k), None);
                };
                sets.push(match k.as_str() {
                    "grade" => "grade = ?",
                    "subject" => "subject = ?",
                    _ => "topic = ?",
                });
                args.push(Value::Text(s.trim().to_string()));
            }
            "durationMinutes" => {
                let Some(n) = v.as_i64().filter(|n| *n > 0) else {
                    return err(
                        &req.id,
                        "bad_params",
                        "durationMinutes must be a positive integer",
                        None,
                    );
                };
                sets.push("duration_minutes = ?");
                args.push(Value::Integer(n));
            }
            _ => return err(&req.id, "bad_params", format!("unknown plan field: {}", k), None),
        }
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }
    sets.push("updated_at = ?");
    args.push(Value::Text(now_ts()));
    args.push(Value::Text(plan_id.clone()));

    let sql = format!(
        "UPDATE plans SET {} WHERE id = ? AND deleted_at IS NULL",
        sets.join(", ")
    );
    match conn.execute(&sql, params_from_iter(args)) {
        Ok(0) => err(&req.id, "not_found", "plan not found", None),
        Ok(_) => match plan_summary(conn, &plan_id) {
            Ok(plan) => ok(&req.id, json!({ "plan": plan })),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_duplicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let placement: Option<(Option<String>, Option<String>)> = match conn
        .query_row(
            "SELECT class_id, folder_id FROM plans WHERE id = ? AND deleted_at IS NULL",
            [&plan_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((class_id, folder_id)) = placement else {
        return err(&req.id, "not_found", "plan not found", None);
    };
    match workspace::copy_plan(
        conn,
        &plan_id,
        class_id.as_deref(),
        folder_id.as_deref(),
        " Copy",
        &now_ts(),
    ) {
        Ok(Some(new_id)) => ok(&req.id, json!({ "planId": new_id })),
        Ok(None) => err(&req.id, "not_found", "plan not found", None),
        Err(e) => err(
            &req.id,
            db::table_failure_code(&e, "db_insert_failed"),
            format!("{e:#}"),
            None,
        ),
    }
}

fn handle_plans_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match parse_opt_string(req.params.get("targetClassId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("targetClassId {}", m), None),
    };
    let folder_id = match parse_opt_string(req.params.get("targetFolderId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("targetFolderId {}", m), None),
    };
    let (class_id, folder_id) = match resolve_placement(conn, class_id, folder_id) {
        Ok(v) => v,
        Err((code, msg)) => return err(&req.id, code, msg, None),
    };
    match conn.execute(
        "UPDATE plans SET class_id = ?, folder_id = ?, updated_at = ?
         WHERE id = ? AND deleted_at IS NULL",
        params![class_id, folder_id, now_ts(), plan_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "plan not found", None),
        Ok(_) => ok(
            &req.id,
            json!({ "planId": plan_id, "classId": class_id, "folderId": folder_id }),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_trash(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = now_ts();
    match conn.execute(
        "UPDATE plans SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        params![now, plan_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "plan not found", None),
        Ok(_) => ok(&req.id, json!({ "planId": plan_id, "deletedAt": now })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let placement = conn
        .query_row(
            "SELECT class_id, folder_id FROM plans WHERE id = ? AND deleted_at IS NOT NULL",
            [&plan_id],
            |r| Ok((r.get::<_, Option<String>>(0)?, r.get::<_, Option<String>>(1)?)),
        )
        .optional();
    let (class_id, folder_id) = match placement {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "no trashed plan with that id", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Trash purges take a container's contents with it, so the plan needs a live home.
    let folder_live = match folder_id.as_deref() {
        Some(fid) => match workspace::folder_ref(conn, fid) {
            Ok(f) => f.is_some_and(|f| f.is_live()),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => true,
    };
    let class_live = match class_id.as_deref() {
        Some(cid) => match workspace::class_is_live(conn, cid) {
            Ok(v) => v == Some(true),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => true,
    };
    if !folder_live || !class_live {
        return err(
            &req.id,
            "bad_params",
            "restore the containing class or folder first",
            None,
        );
    }

    match conn.execute(
        "UPDATE plans SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        [&plan_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "no trashed plan with that id", None),
        Ok(_) => ok(&req.id, json!({ "planId": plan_id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace::purge_plan(conn, &plan_id) {
        Ok(0) => err(&req.id, "not_found", "plan not found", None),
        Ok(_) => ok(&req.id, json!({ "planId": plan_id })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_plans_set_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let plan_id = match parse_opt_string(req.params.get("planId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("planId {}", m), None),
    };
    if let Some(id) = plan_id.as_deref() {
        match plan_is_live(conn, id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "plan not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    state.current_plan_id = plan_id.clone();
    ok(&req.id, json!({ "planId": plan_id }))
}

fn handle_plans_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return no_workspace(req);
    }
    let current = match resolve_current(state) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let plan = match (state.db.as_ref(), current.as_deref()) {
        (Some(conn), Some(id)) => match plan_summary(conn, id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        _ => None,
    };
    ok(&req.id, json!({ "planId": current, "plan": plan }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plans.list" => Some(handle_plans_list(state, req)),
        "plans.create" => Some(handle_plans_create(state, req)),
        "plans.open" => Some(handle_plans_open(state, req)),
        "plans.update" => Some(handle_plans_update(state, req)),
        "plans.duplicate" => Some(handle_plans_duplicate(state, req)),
        "plans.move" => Some(handle_plans_move(state, req)),
        "plans.trash" => Some(handle_plans_trash(state, req)),
        "plans.restore" => Some(handle_plans_restore(state, req)),
        "plans.delete" => Some(handle_plans_delete(state, req)),
        "plans.setCurrent" => Some(handle_plans_set_current(state, req)),
        "plans.current" => Some(handle_plans_current(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_workspace(prefix: &str) -> AppState {
        let ws = std::env::temp_dir().join(format!("{}-{}", prefix, Uuid::new_v4()));
        let mut state = AppState::default();
        crate::ipc::open_workspace(&mut state, &ws).expect("open workspace");
        state
    }

    fn call(state: &mut AppState, method: &str, params: JsonValue) -> JsonValue {
        let req = Request {
            id: "t".into(),
            method: method.into(),
            params,
        };
        try_handle(state, &req).expect("handled")
    }

    #[test]
    fn trashing_current_plan_falls_back_to_latest_live_plan() {
        let mut state = state_with_workspace("plannerd-plans-current");
        let first = call(&mut state, "plans.create", json!({ "title": "First" }));
        let first_id = first["result"]["planId"].as_str().expect("id").to_string();
        let second = call(&mut state, "plans.create", json!({ "title": "Second" }));
        let second_id = second["result"]["planId"].as_str().expect("id").to_string();
        assert_eq!(state.current_plan_id.as_deref(), Some(second_id.as_str()));

        let trashed = call(&mut state, "plans.trash", json!({ "planId": second_id }));
        assert_eq!(trashed["ok"], json!(true));
        let current = call(&mut state, "plans.current", json!({}));
        assert_eq!(current["result"]["planId"], json!(first_id));
    }

    #[test]
    fn folder_from_another_class_is_rejected() {
        let state = state_with_workspace("plannerd-plans-placement");
        let conn = state.db.as_ref().expect("db");
        conn.execute(
            "INSERT INTO classes(id, name, created_at) VALUES('c1', 'A', 't'), ('c2', 'B', 't')",
            [],
        )
        .expect("classes");
        conn.execute(
            "INSERT INTO folders(id, class_id, name, color, created_at) VALUES('f1', 'c1', 'F', '#fff', 't')",
            [],
        )
        .expect("folder");

        let (class_id, _) =
            resolve_placement(conn, None, Some("f1".into())).expect("class from folder");
        assert_eq!(class_id.as_deref(), Some("c1"));
        let e = resolve_placement(conn, Some("c2".into()), Some("f1".into())).expect_err("mismatch");
        assert_eq!(e.0, "bad_params");
        let e = resolve_placement(conn, Some("nope".into()), None).expect_err("missing");
        assert_eq!(e.0, "not_found");
    }
}
