use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::plans::resolve_placement;
use crate::ipc::helpers::{db_conn, now_ts, parse_opt_string, required_str};
use crate::ipc::types::{AppState, ClipboardItem, ClipboardKind, Request};
use crate::workspace;
use rusqlite::OptionalExtension;
use serde_json::json;

fn parse_kind(v: Option<&serde_json::Value>) -> Option<ClipboardKind> {
    serde_json::from_value(v?.clone()).ok()
}

fn handle_clipboard_copy(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(item_type) = parse_kind(req.params.get("itemType")) else {
        return err(&req.id, "bad_params", "itemType must be plan or folder", None);
    };

    let live = match item_type {
        ClipboardKind::Plan => conn
            .query_row(
                "SELECT 1 FROM plans WHERE id = ? AND deleted_at IS NULL",
                [&item_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some())
            .map_err(anyhow::Error::from),
        ClipboardKind::Folder => {
            workspace::folder_ref(conn, &item_id).map(|f| f.is_some_and(|f| f.is_live()))
        }
    };
    match live {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "item not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let item = ClipboardItem { item_id, item_type };
    let reply = json!({ "clipboard": item });
    state.clipboard = Some(item);
    ok(&req.id, reply)
}

fn handle_clipboard_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "clipboard": state.clipboard }))
}

fn handle_clipboard_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.clipboard = None;
    ok(&req.id, json!({ "clipboard": null }))
}

/// Deep-copies the clipboard item into the target. The clipboard keeps its item, so the
/// same plan or folder can be pasted repeatedly.
fn handle_clipboard_paste(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(item) = state.clipboard.as_ref() else {
        return err(&req.id, "bad_params", "clipboard is empty", None);
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

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let now = now_ts();
    let pasted = match item.item_type {
        ClipboardKind::Plan => workspace::copy_plan(
            &tx,
            &item.item_id,
            class_id.as_deref(),
            folder_id.as_deref(),
            "",
            &now,
        ),
        ClipboardKind::Folder => match class_id.as_deref() {
            Some(cid) => workspace::copy_folder_tree(
                &tx,
                &item.item_id,
                cid,
                folder_id.as_deref(),
                None,
                &now,
            ),
            None => {
                let _ = tx.rollback();
                return err(&req.id, "bad_params", "folders paste into a class", None);
            }
        },
    };
    let new_id = match pasted {
        Ok(Some(id)) => id,
        Ok(None) => {
            let _ = tx.rollback();
            return err(&req.id, "not_found", "copied item no longer exists", None);
        }
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                db::table_failure_code(&e, "db_insert_failed"),
                format!("{e:#}"),
                None,
            );
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "newId": new_id,
            "itemType": item.item_type,
            "classId": class_id,
            "folderId": folder_id,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "clipboard.copy" => Some(handle_clipboard_copy(state, req)),
        "clipboard.get" => Some(handle_clipboard_get(state, req)),
        "clipboard.clear" => Some(handle_clipboard_clear(state, req)),
        "clipboard.paste" => Some(handle_clipboard_paste(state, req)),
        _ => None,
    }
}
