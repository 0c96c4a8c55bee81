use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_planner_defaults;
use crate::ipc::helpers::{db_conn, now_ts, parse_bool, parse_opt_string, required_str};
use crate::ipc::types::{AppState, Request};
use crate::workspace::{self, FolderRef, PurgeScope};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const FOLDER_COLUMNS: &str = "f.id, f.class_id, f.parent_id, f.name, f.color, f.created_at, f.deleted_at,
     (SELECT COUNT(*) FROM plans p WHERE p.folder_id = f.id AND p.deleted_at IS NULL),
     (SELECT COUNT(*) FROM folders c WHERE c.parent_id = f.id AND c.deleted_at IS NULL)";

fn folder_json(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "classId": r.get::<_, String>(1)?,
        "parentId": r.get::<_, Option<String>>(2)?,
        "name": r.get::<_, String>(3)?,
        "color": r.get::<_, String>(4)?,
        "createdAt": r.get::<_, String>(5)?,
        "deletedAt": r.get::<_, Option<String>>(6)?,
        "planCount": r.get::<_, i64>(7)?,
        "folderCount": r.get::<_, i64>(8)?,
    }))
}

fn folder_summary(
    conn: &Connection,
    folder_id: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        &format!("SELECT {} FROM folders f WHERE f.id = ?", FOLDER_COLUMNS),
        [folder_id],
        folder_json,
    )
    .optional()
}

fn parse_color(v: &serde_json::Value) -> Result<String, &'static str> {
    let s = v.as_str().map(str::trim).ok_or("color must be string")?;
    if s.len() < 2 || !s.starts_with('#') {
        return Err("color must be a #hex color");
    }
    Ok(s.to_string())
}

/// A live folder, or the reply to send when there is none.
fn live_folder(
    conn: &Connection,
    req: &Request,
    folder_id: &str,
) -> Result<FolderRef, serde_json::Value> {
    match workspace::folder_ref(conn, folder_id) {
        Ok(Some(f)) if f.is_live() => Ok(f),
        Ok(_) => Err(err(&req.id, "not_found", "folder not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_folders_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let parent_id = match parse_opt_string(req.params.get("parentId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("parentId {}", m), None),
    };
    let include_deleted = match parse_bool(req.params.get("includeDeleted"), false) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("includeDeleted {}", m), None),
    };

    let mut sql = format!("SELECT {} FROM folders f WHERE f.class_id = ?", FOLDER_COLUMNS);
    let mut args = vec![class_id];
    match parent_id {
        Some(p) => {
            sql.push_str(" AND f.parent_id = ?");
            args.push(p);
        }
        None => sql.push_str(" AND f.parent_id IS NULL"),
    }
    if !include_deleted {
        sql.push_str(" AND f.deleted_at IS NULL");
    }
    sql.push_str(" ORDER BY f.name, f.id");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let folders = stmt
        .query_map(params_from_iter(args.iter()), folder_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match folders {
        Ok(folders) => ok(&req.id, json!({ "folders": folders })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_folders_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let parent_id = match parse_opt_string(req.params.get("parentId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("parentId {}", m), None),
    };
    let explicit_class = match parse_opt_string(req.params.get("classId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("classId {}", m), None),
    };

    // A nested folder always lives in its parent's class.
    let class_id = match (parent_id.as_deref(), explicit_class) {
        (Some(pid), explicit) => {
            let parent = match live_folder(conn, req, pid) {
                Ok(f) => f,
                Err(e) => return e,
            };
            if explicit.as_deref().is_some_and(|c| c != parent.class_id) {
                return err(&req.id, "bad_params", "parent folder belongs to another class", None);
            }
            parent.class_id
        }
        (None, Some(c)) => c,
        (None, None) => return err(&req.id, "bad_params", "missing classId", None),
    };
    match workspace::class_is_live(conn, &class_id) {
        Ok(Some(true)) => {}
        Ok(_) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let color = match req.params.get("color").filter(|v| !v.is_null()) {
        Some(v) => match parse_color(v) {
            Ok(c) => c,
            Err(m) => return err(&req.id, "bad_params", m, None),
        },
        None => match load_planner_defaults(conn) {
            Ok(d) => d.default_folder_color,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };

    let folder_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO folders(id, class_id, parent_id, name, color, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![folder_id, class_id, parent_id, name, color, now_ts()],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "folders" })),
        );
    }
    match folder_summary(conn, &folder_id) {
        Ok(folder) => ok(&req.id, json!({ "folderId": folder_id, "folder": folder })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_folders_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
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
            "color" => {
                let color = match parse_color(v) {
                    Ok(c) => c,
                    Err(m) => return err(&req.id, "bad_params", m, None),
                };
                sets.push("color = ?");
                args.push(Value::Text(color));
            }
            _ => return err(&req.id, "bad_params", format!("unknown folder field: {}", k), None),
        }
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }
    args.push(Value::Text(folder_id.clone()));

    let sql = format!(
        "UPDATE folders SET {} WHERE id = ? AND deleted_at IS NULL",
        sets.join(", ")
    );
    match conn.execute(&sql, params_from_iter(args)) {
        Ok(0) => err(&req.id, "not_found", "folder not found", None),
        Ok(_) => match folder_summary(conn, &folder_id) {
            Ok(folder) => ok(&req.id, json!({ "folder": folder })),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_folders_trash(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = live_folder(conn, req, &folder_id) {
        return e;
    }
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let now = now_ts();
    if let Err(e) = workspace::trash_folder_tree(&tx, &folder_id, &now) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "folderId": folder_id, "deletedAt": now }))
}

fn handle_folders_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let folder = match workspace::folder_ref(conn, &folder_id) {
        Ok(Some(f)) => f,
        Ok(None) => return err(&req.id, "not_found", "folder not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(stamp) = folder.deleted_at.as_deref() else {
        return err(&req.id, "not_found", "no trashed folder with that id", None);
    };

    // The folder has to come back into a live container.
    let parent_live = match folder.parent_id.as_deref() {
        Some(pid) => match workspace::folder_ref(conn, pid) {
            Ok(p) => p.is_some_and(|p| p.is_live()),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => true,
    };
    let class_live = match workspace::class_is_live(conn, &folder.class_id) {
        Ok(v) => v == Some(true),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !parent_live || !class_live {
        return err(
            &req.id,
            "bad_params",
            "restore the containing class or folder first",
            None,
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = workspace::restore_folder_tree(&tx, &folder_id, stamp) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "folderId": folder_id }))
}

fn handle_folders_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace::folder_ref(conn, &folder_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "folder not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let removed = match workspace::purge_folder_tree(&tx, &folder_id, PurgeScope::All) {
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
        json!({ "folderId": folder_id, "removedPlanIds": removed }),
    )
}

fn handle_folders_duplicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let source = match live_folder(conn, req, &folder_id) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let name = format!("{} Copy", source.name);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let new_id = match workspace::copy_folder_tree(
        &tx,
        &source.id,
        &source.class_id,
        source.parent_id.as_deref(),
        Some(&name),
        &now_ts(),
    ) {
        Ok(Some(id)) => id,
        Ok(None) => {
            let _ = tx.rollback();
            return err(&req.id, "not_found", "folder not found", None);
        }
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", format!("{e:#}"), None);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    match folder_summary(conn, &new_id) {
        Ok(folder) => ok(&req.id, json!({ "folderId": new_id, "folder": folder })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_folders_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let folder_id = match required_str(req, "folderId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let target_parent = match parse_opt_string(req.params.get("targetParentId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("targetParentId {}", m), None),
    };
    let target_class = match parse_opt_string(req.params.get("targetClassId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("targetClassId {}", m), None),
    };
    let folder = match live_folder(conn, req, &folder_id) {
        Ok(f) => f,
        Err(e) => return e,
    };

    let class_id = match target_parent.as_deref() {
        Some(pid) => {
            let subtree = match workspace::folder_subtree_ids(conn, &folder.id) {
                Ok(ids) => ids,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if subtree.iter().any(|id| id == pid) {
                return err(
                    &req.id,
                    "bad_params",
                    "cannot move a folder into itself or one of its descendants",
                    None,
                );
            }
            let parent = match live_folder(conn, req, pid) {
                Ok(f) => f,
                Err(e) => return e,
            };
            if target_class.as_deref().is_some_and(|c| c != parent.class_id) {
                return err(&req.id, "bad_params", "parent folder belongs to another class", None);
            }
            parent.class_id
        }
        None => target_class.unwrap_or_else(|| folder.class_id.clone()),
    };
    match workspace::class_is_live(conn, &class_id) {
        Ok(Some(true)) => {}
        Ok(_) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) =
        workspace::move_folder_tree(&tx, &folder.id, &class_id, target_parent.as_deref())
    {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    match folder_summary(conn, &folder.id) {
        Ok(moved) => ok(&req.id, json!({ "folder": moved })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "folders.list" => Some(handle_folders_list(state, req)),
        "folders.create" => Some(handle_folders_create(state, req)),
        "folders.update" => Some(handle_folders_update(state, req)),
        "folders.trash" => Some(handle_folders_trash(state, req)),
        "folders.restore" => Some(handle_folders_restore(state, req)),
        "folders.delete" => Some(handle_folders_delete(state, req)),
        "folders.duplicate" => Some(handle_folders_duplicate(state, req)),
        "folders.move" => Some(handle_folders_move(state, req)),
        _ => None,
    }
}
