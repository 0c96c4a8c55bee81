use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_planner_defaults;
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::workspace::{self, PurgeScope};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
enum TrashKind {
    Class,
    Folder,
    Plan,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrashedItem {
    #[serde(rename = "type")]
    kind: TrashKind,
    id: String,
    name: String,
    deleted_at: String,
    expires_at: Option<String>,
    #[serde(skip)]
    expired: bool,
}

// Items trashed together with their container share its stamp and are listed through it.
const TRASHED_SQL: &str = "
    SELECT 'class', c.id, c.name, c.deleted_at
    FROM classes c
    WHERE c.deleted_at IS NOT NULL
    UNION ALL
    SELECT 'folder', f.id, f.name, f.deleted_at
    FROM folders f
    WHERE f.deleted_at IS NOT NULL
      AND NOT EXISTS (SELECT 1 FROM classes c
                      WHERE c.id = f.class_id AND c.deleted_at = f.deleted_at)
      AND NOT EXISTS (SELECT 1 FROM folders pf
                      WHERE pf.id = f.parent_id AND pf.deleted_at = f.deleted_at)
    UNION ALL
    SELECT 'plan', p.id, p.title, p.deleted_at
    FROM plans p
    WHERE p.deleted_at IS NOT NULL
      AND NOT EXISTS (SELECT 1 FROM classes c
                      WHERE c.id = p.class_id AND c.deleted_at = p.deleted_at)
      AND NOT EXISTS (SELECT 1 FROM folders pf
                      WHERE pf.id = p.folder_id AND pf.deleted_at = p.deleted_at)";

fn trashed_items(
    conn: &Connection,
    retention_days: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<TrashedItem>> {
    let mut stmt = conn.prepare(TRASHED_SQL)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut items = Vec::with_capacity(rows.len());
    for (kind, id, name, deleted_at) in rows {
        let kind = match kind.as_str() {
            "class" => TrashKind::Class,
            "folder" => TrashKind::Folder,
            _ => TrashKind::Plan,
        };
        let expires = match DateTime::parse_from_rfc3339(&deleted_at) {
            Ok(t) => Some(t.with_timezone(&Utc) + Duration::days(retention_days)),
            Err(e) => {
                // Never purge on an unreadable stamp; the item stays until deleted by hand.
                tracing::warn!(id = %id, deleted_at = %deleted_at, error = %e, "unreadable trash stamp");
                None
            }
        };
        items.push(TrashedItem {
            kind,
            id,
            name,
            deleted_at,
            expires_at: expires.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            expired: expires.is_some_and(|t| t <= now),
        });
    }
    items.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then_with(|| a.id.cmp(&b.id)));
    Ok(items)
}

fn handle_trash_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let defaults = match load_planner_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match trashed_items(conn, defaults.trash_retention_days, Utc::now()) {
        Ok(items) => {
            let live: Vec<&TrashedItem> = items.iter().filter(|i| !i.expired).collect();
            ok(
                &req.id,
                json!({ "items": live, "retentionDays": defaults.trash_retention_days }),
            )
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn purge_item(conn: &Connection, item: &TrashedItem) -> anyhow::Result<()> {
    match item.kind {
        TrashKind::Class => {
            workspace::purge_class(conn, &item.id, PurgeScope::TrashedOnly)?;
        }
        TrashKind::Folder => {
            workspace::purge_folder_tree(conn, &item.id, PurgeScope::TrashedOnly)?;
        }
        TrashKind::Plan => {
            workspace::purge_plan(conn, &item.id)?;
        }
    }
    Ok(())
}

fn handle_trash_purge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let defaults = match load_planner_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let items = match trashed_items(conn, defaults.trash_retention_days, Utc::now()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut purged = Vec::new();
    for item in items.iter().filter(|i| i.expired) {
        if let Err(e) = purge_item(&tx, item) {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
        purged.push(json!({ "type": item.kind, "id": item.id }));
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    if !purged.is_empty() {
        tracing::info!(count = purged.len(), "purged expired trash");
    }
    ok(&req.id, json!({ "purged": purged }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "trash.list" => Some(handle_trash_list(state, req)),
        "trash.purge" => Some(handle_trash_purge(state, req)),
        _ => None,
    }
}
