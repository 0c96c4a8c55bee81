use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, parse_bool, parse_opt_string, required_str};
use crate::ipc::types::{AppState, Request};
use crate::workspace::{self, PurgeScope};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn class_json(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "section": r.get::<_, String>(2)?,
        "createdAt": r.get::<_, String>(3)?,
        "deletedAt": r.get::<_, Option<String>>(4)?,
        "folderCount": r.get::<_, i64>(5)?,
        "planCount": r.get::<_, i64>(6)?,
    }))
}

// Correlated subqueries so the counts never double up through joins.
const CLASS_SELECT: &str = "SELECT
       c.id,
       c.name,
       c.section,
       c.created_at,
       c.deleted_at,
       (SELECT COUNT(*) FROM folders f WHERE f.class_id = c.id AND f.deleted_at IS NULL),
       (SELECT COUNT(*) FROM plans p WHERE p.class_id = c.id AND p.deleted_at IS NULL)
     FROM classes c";

fn class_summary(conn: &Connection, class_id: &str) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        &format!("{} WHERE c.id = ?", CLASS_SELECT),
        [class_id],
        class_json,
    )
    .optional()
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    let include_deleted = match parse_bool(req.params.get("includeDeleted"), false) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("includeDeleted {}", m), None),
    };
    let sql = if include_deleted {
        format!("{} ORDER BY c.name, c.section, c.id", CLASS_SELECT)
    } else {
        format!(
            "{} WHERE c.deleted_at IS NULL ORDER BY c.name, c.section, c.id",
            CLASS_SELECT
        )
    };
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], class_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section = match parse_opt_string(req.params.get("section")) {
        Ok(v) => v.unwrap_or_default(),
        Err(m) => return err(&req.id, "bad_params", format!("section {}", m), None),
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, section, created_at) VALUES(?, ?, ?, ?)",
        (&class_id, &name, &section, now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({ "classId": class_id, "name": name, "section": section }),
    )
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
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
            "name" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "name must be a non-empty string", None);
                };
                sets.push("name = ?");
                args.push(Value::Text(s.to_string()));
            }
            "section" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "section must be string", None);
                };
                sets.push("section = ?");
                args.push(Value::Text(s.trim().to_string()));
            }
            _ => return err(&req.id, "bad_params", format!("unknown class field: {}", k), None),
        }
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }
    args.push(Value::Text(class_id.clone()));

    let sql = format!(
        "UPDATE classes SET {} WHERE id = ? AND deleted_at IS NULL",
        sets.join(", ")
    );
    match conn.execute(&sql, params_from_iter(args)) {
        Ok(0) => err(&req.id, "not_found", "class not found", None),
        Ok(_) => match class_summary(conn, &class_id) {
            Ok(class) => ok(&req.id, json!({ "class": class })),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_classes_trash(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let now = now_ts();
    match workspace::trash_class(&tx, &class_id, &now) {
        Ok(0) => {
            let _ = tx.rollback();
            return err(&req.id, "not_found", "class not found", None);
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "classId": class_id, "deletedAt": now }))
}

fn handle_classes_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    match workspace::restore_class(&tx, &class_id) {
        Ok(0) => {
            let _ = tx.rollback();
            return err(&req.id, "not_found", "no trashed class with that id", None);
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "classId": class_id }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace::class_is_live(conn, &class_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let removed = match workspace::purge_class(&tx, &class_id, PurgeScope::All) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "classId": class_id, "removedPlanIds": removed }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.trash" => Some(handle_classes_trash(state, req)),
        "classes.restore" => Some(handle_classes_restore(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
