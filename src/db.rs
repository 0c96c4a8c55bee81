use crate::table::Table;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "planner.sqlite3";

/// A stored `table_json` that no longer decodes into a valid table.
#[derive(Debug, thiserror::Error)]
#[error("stored table for plan {plan_id} is malformed")]
pub struct MalformedTable {
    pub plan_id: String,
    #[source]
    pub source: serde_json::Error,
}

/// Reply code for a failed table load or copy: `corrupt_table` when the stored JSON is bad,
/// `fallback` for everything else.
pub fn table_failure_code(e: &anyhow::Error, fallback: &'static str) -> &'static str {
    if e.downcast_ref::<MalformedTable>().is_some() {
        "corrupt_table"
    } else {
        fallback
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS folders(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            parent_id TEXT,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(parent_id) REFERENCES folders(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_folders_class ON folders(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS plans(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            folder_id TEXT,
            title TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            duration_minutes INTEGER NOT NULL,
            template_id TEXT,
            table_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(folder_id) REFERENCES folders(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plans_class ON plans(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_plans_folder ON plans(folder_id)",
        [],
    )?;

    // Topic was added after the first schema; older workspaces get the column here.
    ensure_plans_topic(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_plans_topic(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "plans", "topic")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE plans ADD COLUMN topic TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid json", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Loads a live (not trashed) plan's table. `Ok(None)` when the plan does not exist.
pub fn load_plan_table(conn: &Connection, plan_id: &str) -> anyhow::Result<Option<Table>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT table_json FROM plans WHERE id = ? AND deleted_at IS NULL",
            [plan_id],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => {
            let table: Table = serde_json::from_str(&s).map_err(|source| MalformedTable {
                plan_id: plan_id.to_string(),
                source,
            })?;
            Ok(Some(table))
        }
        None => Ok(None),
    }
}

pub fn save_plan_table(
    conn: &Connection,
    plan_id: &str,
    table: &Table,
    updated_at: &str,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(table)?;
    conn.execute(
        "UPDATE plans SET table_json = ?, updated_at = ? WHERE id = ?",
        (json, updated_at, plan_id),
    )?;
    Ok(())
}

/// Replaces the table and records which template produced it, in one statement.
pub fn save_plan_table_with_template(
    conn: &Connection,
    plan_id: &str,
    table: &Table,
    template_id: Option<&str>,
    updated_at: &str,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(table)?;
    conn.execute(
        "UPDATE plans SET table_json = ?, template_id = ?, updated_at = ? WHERE id = ?",
        (json, template_id, updated_at, plan_id),
    )?;
    Ok(())
}
