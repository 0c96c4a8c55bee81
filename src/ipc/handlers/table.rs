use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_planner_defaults, PlannerDefaults};
use crate::ipc::handlers::templates::{parse_field_content, parse_fields};
use crate::ipc::helpers::{db_conn, now_ts, parse_opt_index, required_index, required_str};
use crate::ipc::types::{AppState, Request};
use crate::table::{ErrorKind, Table, TableError, FULL_WIDTH};
use crate::template;
use serde_json::{json, Value as JsonValue};

/// Plan columns written alongside the table when an edit applies.
enum TemplateColumn {
    Keep,
    Set(Option<&'static str>),
}

fn run_edit<F>(state: &AppState, req: &Request, edit: F) -> serde_json::Value
where
    F: FnOnce(&mut Table, &PlannerDefaults) -> Result<Option<String>, TableError>,
{
    run_edit_with(state, req, TemplateColumn::Keep, edit)
}

/// Loads the plan's table, applies `edit`, and persists the result when it succeeded.
///
/// Edits that miss (unknown row/cell) or are refused (shape mismatch, last cell) reply `ok`
/// with `applied: false` and the untouched table. Out-of-range positions are `bad_params`.
fn run_edit_with<F>(
    state: &AppState,
    req: &Request,
    template: TemplateColumn,
    edit: F,
) -> serde_json::Value
where
    F: FnOnce(&mut Table, &PlannerDefaults) -> Result<Option<String>, TableError>,
{
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match load_planner_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut table = match db::load_plan_table(conn, &plan_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "plan not found", None),
        Err(e) => {
            let code = db::table_failure_code(&e, "db_query_failed");
            if code == "corrupt_table" {
                tracing::warn!(plan_id = %plan_id, error = %e, "stored table unreadable");
            }
            return err(&req.id, code, format!("{e:#}"), None);
        }
    };

    match edit(&mut table, &defaults) {
        Ok(new_id) => {
            let now = now_ts();
            let saved = match template {
                TemplateColumn::Keep => db::save_plan_table(conn, &plan_id, &table, &now),
                TemplateColumn::Set(template_id) => {
                    db::save_plan_table_with_template(conn, &plan_id, &table, template_id, &now)
                }
            };
            if let Err(e) = saved {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            tracing::debug!(
                method = %req.method,
                plan_id = %plan_id,
                rows = table.len(),
                cells = table.rows().iter().map(|r| r.cells.len()).sum::<usize>(),
                "table edit applied"
            );
            let mut result = json!({
                "planId": plan_id,
                "applied": true,
                "table": table,
            });
            if let Some(id) = new_id {
                result["newId"] = JsonValue::String(id);
            }
            ok(&req.id, result)
        }
        Err(e) if e.kind() == ErrorKind::OutOfRange => err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "reason": e.code() })),
        ),
        Err(e) => {
            tracing::debug!(method = %req.method, plan_id = %plan_id, reason = e.code(), "table edit skipped");
            ok(
                &req.id,
                json!({
                    "planId": plan_id,
                    "applied": false,
                    "skipped": { "code": e.code(), "message": e.to_string() },
                    "table": table,
                }),
            )
        }
    }
}

fn handle_add_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let at = match parse_opt_index(req.params.get("atIndex")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("atIndex {}", m), None),
    };
    run_edit(state, req, |table, defaults| {
        Ok(Some(table.add_row(at, &defaults.new_cell_placeholder)))
    })
}

fn handle_remove_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_edit(state, req, |table, _| table.remove_row(&row_id).map(|_| None))
}

fn handle_move_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let from = match required_index(req, "fromIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let to = match required_index(req, "toIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_edit(state, req, |table, _| table.move_row(from, to).map(|_| None))
}

fn handle_update_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cell_id = match required_str(req, "cellId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Content is stored verbatim, so it is neither trimmed nor required to be non-empty.
    let Some(content) = req.params.get("content").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "content must be a string", None);
    };
    run_edit(state, req, |table, _| {
        table
            .update_cell_content(&row_id, &cell_id, content)
            .map(|_| None)
    })
}

fn handle_resize_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("sizes").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "sizes must be an array of numbers", None);
    };
    let mut sizes = Vec::with_capacity(raw.len());
    for v in raw {
        match v.as_f64() {
            Some(n) => sizes.push(n),
            None => return err(&req.id, "bad_params", "sizes must be an array of numbers", None),
        }
    }
    run_edit(state, req, |table, _| {
        table.resize_row(&row_id, &sizes)?;
        if let Some(row) = table.row(&row_id) {
            let total = row.width_total();
            if (total - FULL_WIDTH).abs() > 0.01 {
                tracing::debug!(row_id = %row_id, total, "row width no longer sums to full width");
            }
        }
        Ok(None)
    })
}

fn handle_split_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cell_id = match required_str(req, "cellId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_edit(state, req, |table, defaults| {
        table
            .split_cell(&row_id, &cell_id, &defaults.new_cell_placeholder)
            .map(Some)
    })
}

fn handle_merge_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cell_id = match required_str(req, "cellId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_edit(state, req, |table, _| {
        table.merge_cell(&row_id, &cell_id).map(|_| None)
    })
}

fn handle_move_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let row_id = match required_str(req, "rowId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let from = match required_index(req, "fromIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let to = match required_index(req, "toIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_edit(state, req, |table, _| {
        table.move_cell(&row_id, from, to).map(|_| None)
    })
}

fn handle_apply_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let template_id = req.params.get("templateId").and_then(|v| v.as_str());
    let explicit_fields = match parse_fields(req.params.get("fields")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let prefill = match parse_field_content(req.params.get("fieldContent")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let (fields, applied_template) = match (template_id, explicit_fields.is_empty()) {
        (Some(_), false) => {
            return err(&req.id, "bad_params", "pass templateId or fields, not both", None)
        }
        (Some(id), true) => match template::find_template(id) {
            Some(t) => (t.fields.to_vec(), Some(t.id)),
            None => return err(&req.id, "bad_params", format!("unknown template: {}", id), None),
        },
        (None, false) => (explicit_fields, None),
        (None, true) => {
            return err(&req.id, "bad_params", "templateId or fields required", None)
        }
    };

    run_edit_with(state, req, TemplateColumn::Set(applied_template), |table, _| {
        table.apply_template(template::build_rows(&fields, &prefill));
        if table.is_empty() {
            tracing::debug!("template produced no rows");
        }
        Ok(None)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "table.addRow" => Some(handle_add_row(state, req)),
        "table.removeRow" => Some(handle_remove_row(state, req)),
        "table.moveRow" => Some(handle_move_row(state, req)),
        "table.updateCell" => Some(handle_update_cell(state, req)),
        "table.resizeRow" => Some(handle_resize_row(state, req)),
        "table.splitCell" => Some(handle_split_cell(state, req)),
        "table.mergeCell" => Some(handle_merge_cell(state, req)),
        "table.moveCell" => Some(handle_move_cell(state, req)),
        "table.applyTemplate" => Some(handle_apply_template(state, req)),
        _ => None,
    }
}
