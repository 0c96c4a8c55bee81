use crate::db;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FolderRef {
    pub id: String,
    pub class_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub color: String,
    pub deleted_at: Option<String>,
}

impl FolderRef {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

pub fn class_is_live(conn: &Connection, class_id: &str) -> anyhow::Result<Option<bool>> {
    let deleted: Option<Option<String>> = conn
        .query_row(
            "SELECT deleted_at FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(deleted.map(|d| d.is_none()))
}

pub fn folder_ref(conn: &Connection, folder_id: &str) -> anyhow::Result<Option<FolderRef>> {
    let folder = conn
        .query_row(
            "SELECT id, class_id, parent_id, name, color, deleted_at FROM folders WHERE id = ?",
            [folder_id],
            |r| {
                Ok(FolderRef {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    parent_id: r.get(2)?,
                    name: r.get(3)?,
                    color: r.get(4)?,
                    deleted_at: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(folder)
}

/// The folder and all folders nested under it, root first.
pub fn folder_subtree_ids(conn: &Connection, root_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE subtree(id, depth) AS (
           SELECT id, 0 FROM folders WHERE id = ?
           UNION ALL
           SELECT f.id, s.depth + 1 FROM folders f JOIN subtree s ON f.parent_id = s.id
         )
         SELECT id FROM subtree ORDER BY depth",
    )?;
    let ids = stmt
        .query_map([root_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

pub fn purge_plan(conn: &Connection, plan_id: &str) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM plans WHERE id = ?", [plan_id])?)
}

/// Which rows a purge may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    /// Everything in the container, live or trashed.
    All,
    /// Only trashed rows. Live plans found inside are moved out of the container first.
    TrashedOnly,
}

impl PurgeScope {
    fn row_filter(self) -> &'static str {
        match self {
            PurgeScope::All => "",
            PurgeScope::TrashedOnly => " AND deleted_at IS NOT NULL",
        }
    }
}

/// Permanently removes a folder, its nested folders and the plans filed inside them.
/// Returns the removed plan ids.
pub fn purge_folder_tree(
    conn: &Connection,
    root_id: &str,
    scope: PurgeScope,
) -> anyhow::Result<Vec<String>> {
    let ids = folder_subtree_ids(conn, root_id)?;
    if ids.is_empty() {
        return Ok(ids);
    }
    let marks = placeholders(ids.len());
    let filter = scope.row_filter();
    if scope == PurgeScope::TrashedOnly {
        let rescued = conn.execute(
            &format!(
                "UPDATE plans SET folder_id = NULL WHERE folder_id IN ({}) AND deleted_at IS NULL",
                marks
            ),
            params_from_iter(ids.iter()),
        )?;
        if rescued > 0 {
            tracing::warn!(folder_id = %root_id, rescued, "live plans moved out of purged folder");
        }
    }
    let removed_plans = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM plans WHERE folder_id IN ({}){}",
            marks, filter
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    conn.execute(
        &format!("DELETE FROM plans WHERE folder_id IN ({}){}", marks, filter),
        params_from_iter(ids.iter()),
    )?;
    conn.execute(
        &format!("DELETE FROM folders WHERE id IN ({}){}", marks, filter),
        params_from_iter(ids.iter()),
    )?;
    Ok(removed_plans)
}

/// Permanently removes a class with its folders and plans. Returns the removed plan ids.
pub fn purge_class(
    conn: &Connection,
    class_id: &str,
    scope: PurgeScope,
) -> anyhow::Result<Vec<String>> {
    let filter = scope.row_filter();
    if scope == PurgeScope::TrashedOnly {
        let rescued = conn.execute(
            "UPDATE plans SET class_id = NULL, folder_id = NULL
             WHERE class_id = ? AND deleted_at IS NULL",
            [class_id],
        )?;
        if rescued > 0 {
            tracing::warn!(class_id = %class_id, rescued, "live plans moved out of purged class");
        }
    }
    let removed_plans = {
        let mut stmt = conn.prepare(&format!("SELECT id FROM plans WHERE class_id = ?{}", filter))?;
        let ids = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    // Explicit dependency order: plans, then folders, then the class.
    conn.execute(&format!("DELETE FROM plans WHERE class_id = ?{}", filter), [class_id])?;
    conn.execute(&format!("DELETE FROM folders WHERE class_id = ?{}", filter), [class_id])?;
    conn.execute(&format!("DELETE FROM classes WHERE id = ?{}", filter), [class_id])?;
    Ok(removed_plans)
}

/// Copies a live plan with a re-identified table. `Ok(None)` when the source is missing.
pub fn copy_plan(
    conn: &Connection,
    plan_id: &str,
    class_id: Option<&str>,
    folder_id: Option<&str>,
    title_suffix: &str,
    now: &str,
) -> anyhow::Result<Option<String>> {
    let Some(table) = db::load_plan_table(conn, plan_id)? else {
        return Ok(None);
    };
    let table_json = serde_json::to_string(&table.duplicate())?;
    let new_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO plans(id, class_id, folder_id, title, grade, subject, topic, duration_minutes,
                           template_id, table_json, created_at, updated_at)
         SELECT ?, ?, ?, title || ?, grade, subject, topic, duration_minutes,
                template_id, ?, ?, ?
         FROM plans WHERE id = ?",
        params![new_id, class_id, folder_id, title_suffix, table_json, now, now, plan_id],
    )?;
    Ok(Some(new_id))
}

/// Deep-copies a live folder with its live contents under `parent_id` in `class_id`.
///
/// The source tree is snapshotted first, so pasting a folder into itself or one of its
/// descendants copies the tree once.
pub fn copy_folder_tree(
    conn: &Connection,
    folder_id: &str,
    class_id: &str,
    parent_id: Option<&str>,
    name: Option<&str>,
    now: &str,
) -> anyhow::Result<Option<String>> {
    let source_tree: HashSet<String> = folder_subtree_ids(conn, folder_id)?.into_iter().collect();
    copy_folder_node(conn, folder_id, class_id, parent_id, name, now, &source_tree)
}

fn copy_folder_node(
    conn: &Connection,
    folder_id: &str,
    class_id: &str,
    parent_id: Option<&str>,
    name: Option<&str>,
    now: &str,
    source_tree: &HashSet<String>,
) -> anyhow::Result<Option<String>> {
    let Some(source) = folder_ref(conn, folder_id)? else {
        return Ok(None);
    };
    if !source.is_live() {
        return Ok(None);
    }
    let plan_ids = {
        let mut stmt = conn.prepare(
            "SELECT id FROM plans WHERE folder_id = ? AND deleted_at IS NULL ORDER BY created_at, id",
        )?;
        let ids = stmt
            .query_map([folder_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    let child_ids = {
        let mut stmt = conn.prepare(
            "SELECT id FROM folders WHERE parent_id = ? AND deleted_at IS NULL ORDER BY created_at, id",
        )?;
        let ids = stmt
            .query_map([folder_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let new_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO folders(id, class_id, parent_id, name, color, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            new_id,
            class_id,
            parent_id,
            name.unwrap_or(&source.name),
            source.color,
            now
        ],
    )?;

    for plan_id in plan_ids {
        copy_plan(conn, &plan_id, Some(class_id), Some(&new_id), "", now)?;
    }
    for child_id in child_ids.iter().filter(|id| source_tree.contains(*id)) {
        copy_folder_node(conn, child_id, class_id, Some(&new_id), None, now, source_tree)?;
    }
    Ok(Some(new_id))
}

/// Re-parents a folder; nested folders and filed plans follow it into `class_id`.
pub fn move_folder_tree(
    conn: &Connection,
    folder_id: &str,
    class_id: &str,
    parent_id: Option<&str>,
) -> anyhow::Result<()> {
    let ids = folder_subtree_ids(conn, folder_id)?;
    conn.execute(
        "UPDATE folders SET parent_id = ? WHERE id = ?",
        params![parent_id, folder_id],
    )?;
    if ids.is_empty() {
        return Ok(());
    }
    let marks = placeholders(ids.len());
    let args = in_clause_args(class_id, &ids);
    conn.execute(
        &format!("UPDATE folders SET class_id = ? WHERE id IN ({})", marks),
        params_from_iter(args.iter()),
    )?;
    conn.execute(
        &format!("UPDATE plans SET class_id = ? WHERE folder_id IN ({})", marks),
        params_from_iter(args.iter()),
    )?;
    Ok(())
}

/// Most recently edited plan that is not in the trash.
pub fn latest_live_plan(conn: &Connection) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM plans WHERE deleted_at IS NULL ORDER BY updated_at DESC, id LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn in_clause_args(first: &str, ids: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(ids.len() + 1);
    args.push(first.to_string());
    args.extend(ids.iter().cloned());
    args
}

/// Trashes a folder and everything live beneath it with one shared `deleted_at` stamp.
pub fn trash_folder_tree(conn: &Connection, folder_id: &str, now: &str) -> anyhow::Result<()> {
    let ids = folder_subtree_ids(conn, folder_id)?;
    if ids.is_empty() {
        return Ok(());
    }
    let marks = placeholders(ids.len());
    let args = in_clause_args(now, &ids);
    conn.execute(
        &format!(
            "UPDATE folders SET deleted_at = ? WHERE id IN ({}) AND deleted_at IS NULL",
            marks
        ),
        params_from_iter(args.iter()),
    )?;
    conn.execute(
        &format!(
            "UPDATE plans SET deleted_at = ? WHERE folder_id IN ({}) AND deleted_at IS NULL",
            marks
        ),
        params_from_iter(args.iter()),
    )?;
    Ok(())
}

/// Restores a trashed folder and the contents that were trashed together with it.
/// Items trashed separately, before or after, keep their own stamp.
pub fn restore_folder_tree(conn: &Connection, folder_id: &str, stamp: &str) -> anyhow::Result<()> {
    let ids = folder_subtree_ids(conn, folder_id)?;
    if ids.is_empty() {
        return Ok(());
    }
    let marks = placeholders(ids.len());
    let args = in_clause_args(stamp, &ids);
    conn.execute(
        &format!(
            "UPDATE folders SET deleted_at = NULL WHERE deleted_at = ? AND id IN ({})",
            marks
        ),
        params_from_iter(args.iter()),
    )?;
    conn.execute(
        &format!(
            "UPDATE plans SET deleted_at = NULL WHERE deleted_at = ? AND folder_id IN ({})",
            marks
        ),
        params_from_iter(args.iter()),
    )?;
    Ok(())
}

pub fn trash_class(conn: &Connection, class_id: &str, now: &str) -> anyhow::Result<usize> {
    let n = conn.execute(
        "UPDATE classes SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        params![now, class_id],
    )?;
    if n == 0 {
        return Ok(0);
    }
    conn.execute(
        "UPDATE folders SET deleted_at = ? WHERE class_id = ? AND deleted_at IS NULL",
        params![now, class_id],
    )?;
    conn.execute(
        "UPDATE plans SET deleted_at = ? WHERE class_id = ? AND deleted_at IS NULL",
        params![now, class_id],
    )?;
    Ok(n)
}

/// Restores a trashed class with the folders and plans that share its stamp.
pub fn restore_class(conn: &Connection, class_id: &str) -> anyhow::Result<usize> {
    let stamp: Option<Option<String>> = conn
        .query_row(
            "SELECT deleted_at FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(Some(stamp)) = stamp else {
        return Ok(0);
    };
    conn.execute(
        "UPDATE classes SET deleted_at = NULL WHERE id = ?",
        [class_id],
    )?;
    conn.execute(
        "UPDATE folders SET deleted_at = NULL WHERE class_id = ? AND deleted_at = ?",
        params![class_id, stamp],
    )?;
    conn.execute(
        "UPDATE plans SET deleted_at = NULL WHERE class_id = ? AND deleted_at = ?",
        params![class_id, stamp],
    )?;
    Ok(1)
}
