use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Width budget of a row, in percent.
pub const FULL_WIDTH: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    /// Rich-text HTML, stored verbatim.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub placeholder: String,
    /// Width percentage within the owning row.
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: String,
    pub cells: Vec<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_header: Option<bool>,
}

impl Row {
    pub fn width_total(&self) -> f64 {
        self.cells.iter().map(|c| c.size).sum()
    }

    fn cell_index(&self, cell_id: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.id == cell_id)
    }
}

/// How a failed edit should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The edit referenced an id that is not in the table.
    NotFound,
    /// The edit was well-addressed but would break a table invariant or had the wrong shape.
    Rejected,
    /// A positional argument does not address an existing row or cell.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("row {0} not found")]
    RowNotFound(String),
    #[error("cell {cell_id} not found in row {row_id}")]
    CellNotFound { row_id: String, cell_id: String },
    #[error("index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("expected {expected} sizes, got {got}")]
    SizeCountMismatch { expected: usize, got: usize },
    #[error("row {0} has a single cell")]
    LastCell(String),
    #[error("malformed table: {0}")]
    Malformed(String),
}

impl TableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RowNotFound(_) | Self::CellNotFound { .. } => ErrorKind::NotFound,
            Self::IndexOutOfRange { .. } => ErrorKind::OutOfRange,
            Self::SizeCountMismatch { .. } | Self::LastCell(_) | Self::Malformed(_) => {
                ErrorKind::Rejected
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RowNotFound(_) => "row_not_found",
            Self::CellNotFound { .. } => "cell_not_found",
            Self::IndexOutOfRange { .. } => "out_of_range",
            Self::SizeCountMismatch { .. } => "size_count_mismatch",
            Self::LastCell(_) => "last_cell",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Shape of a cell to be created; ids are assigned when it is materialized into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSpec {
    pub content: String,
    pub placeholder: String,
    pub size: f64,
}

impl CellSpec {
    pub fn new(content: impl Into<String>, placeholder: impl Into<String>, size: f64) -> Self {
        Self {
            content: content.into(),
            placeholder: placeholder.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSpec {
    pub cells: Vec<CellSpec>,
    pub is_header: bool,
}

impl RowSpec {
    pub fn new(cells: Vec<CellSpec>) -> Self {
        Self {
            cells,
            is_header: false,
        }
    }

    pub fn header(cells: Vec<CellSpec>) -> Self {
        Self {
            cells,
            is_header: true,
        }
    }
}

/// The editable lesson-plan table: an ordered list of rows, each an ordered list of cells.
///
/// Every mutation is all-or-nothing. A failed edit returns a [`TableError`] and leaves the
/// table exactly as it was. Deserialization validates the structure, so a `Table` value is
/// always well-formed: no empty rows, no duplicate or blank ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Row>", into = "Vec<Row>")]
pub struct Table {
    rows: Vec<Row>,
}

impl TryFrom<Vec<Row>> for Table {
    type Error = TableError;

    fn try_from(rows: Vec<Row>) -> Result<Self, Self::Error> {
        let table = Table { rows };
        table.validate()?;
        Ok(table)
    }
}

impl From<Table> for Vec<Row> {
    fn from(table: Table) -> Self {
        table.rows
    }
}

impl Table {
    pub fn from_specs<I>(specs: I) -> Self
    where
        I: IntoIterator<Item = RowSpec>,
    {
        Table {
            rows: materialize(specs, &mut HashSet::new()),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for row in &self.rows {
            if row.id.trim().is_empty() {
                return Err(TableError::Malformed("row with blank id".into()));
            }
            if !seen.insert(row.id.as_str()) {
                return Err(TableError::Malformed(format!("duplicate id {}", row.id)));
            }
            if row.cells.is_empty() {
                return Err(TableError::Malformed(format!("row {} has no cells", row.id)));
            }
            for cell in &row.cells {
                if cell.id.trim().is_empty() {
                    return Err(TableError::Malformed(format!(
                        "cell with blank id in row {}",
                        row.id
                    )));
                }
                if !seen.insert(cell.id.as_str()) {
                    return Err(TableError::Malformed(format!("duplicate id {}", cell.id)));
                }
            }
        }
        Ok(())
    }

    /// Inserts a new row and returns its id.
    ///
    /// When `at` addresses an existing row, the new row goes right after it and copies its
    /// cell count with an equal split of the width. Otherwise a single full-width cell row is
    /// appended.
    pub fn add_row(&mut self, at: Option<usize>, placeholder: &str) -> String {
        let mut taken = self.id_set();
        let (insert_at, count) = match at.and_then(|i| self.rows.get(i).map(|r| (i, r.cells.len()))) {
            Some((i, n)) => (i + 1, n),
            None => (self.rows.len(), 1),
        };
        let cells = equal_split(count)
            .into_iter()
            .map(|size| Cell {
                id: mint_id(&mut taken),
                content: String::new(),
                placeholder: placeholder.to_string(),
                size,
            })
            .collect();
        let row = Row {
            id: mint_id(&mut taken),
            cells,
            is_header: None,
        };
        let row_id = row.id.clone();
        self.rows.insert(insert_at, row);
        row_id
    }

    pub fn remove_row(&mut self, row_id: &str) -> Result<Row, TableError> {
        let index = self.row_index(row_id)?;
        Ok(self.rows.remove(index))
    }

    pub fn move_row(&mut self, from: usize, to: usize) -> Result<(), TableError> {
        move_within(&mut self.rows, from, to)
    }

    /// Replaces the cell's HTML verbatim. Sanitizing is the editor engine's job.
    pub fn update_cell_content(
        &mut self,
        row_id: &str,
        cell_id: &str,
        content: impl Into<String>,
    ) -> Result<(), TableError> {
        let row = self.row_mut(row_id)?;
        let index = row
            .cell_index(cell_id)
            .ok_or_else(|| cell_not_found(row_id, cell_id))?;
        row.cells[index].content = content.into();
        Ok(())
    }

    /// Assigns `sizes` to the row's cells by position. The values are taken as given and
    /// are not renormalized to sum to [`FULL_WIDTH`].
    pub fn resize_row(&mut self, row_id: &str, sizes: &[f64]) -> Result<(), TableError> {
        let row = self.row_mut(row_id)?;
        if row.cells.len() != sizes.len() {
            return Err(TableError::SizeCountMismatch {
                expected: row.cells.len(),
                got: sizes.len(),
            });
        }
        for (cell, size) in row.cells.iter_mut().zip(sizes) {
            cell.size = *size;
        }
        Ok(())
    }

    /// Halves the cell and inserts an empty sibling of the same width right after it.
    /// Returns the new cell's id.
    pub fn split_cell(
        &mut self,
        row_id: &str,
        cell_id: &str,
        placeholder: &str,
    ) -> Result<String, TableError> {
        let mut taken = self.id_set();
        let row = self.row_mut(row_id)?;
        let index = row
            .cell_index(cell_id)
            .ok_or_else(|| cell_not_found(row_id, cell_id))?;
        let half = row.cells[index].size / 2.0;
        row.cells[index].size = half;
        let new_cell = Cell {
            id: mint_id(&mut taken),
            content: String::new(),
            placeholder: placeholder.to_string(),
            size: half,
        };
        let new_id = new_cell.id.clone();
        row.cells.insert(index + 1, new_cell);
        Ok(new_id)
    }

    /// Removes the cell and gives its width to the previous cell, or to the next one when it
    /// was first in the row. A row never loses its last cell, so this never empties a row.
    pub fn merge_cell(&mut self, row_id: &str, cell_id: &str) -> Result<(), TableError> {
        let row = self.row_mut(row_id)?;
        let index = row
            .cell_index(cell_id)
            .ok_or_else(|| cell_not_found(row_id, cell_id))?;
        if row.cells.len() == 1 {
            return Err(TableError::LastCell(row_id.to_string()));
        }
        let removed = row.cells.remove(index);
        // After removal the next cell has shifted into `index`.
        let target = index.saturating_sub(1);
        row.cells[target].size += removed.size;
        Ok(())
    }

    pub fn move_cell(&mut self, row_id: &str, from: usize, to: usize) -> Result<(), TableError> {
        let row = self.row_mut(row_id)?;
        move_within(&mut row.cells, from, to)
    }

    /// Discards every row and rebuilds the table from `specs`. Specs without cells are
    /// skipped.
    pub fn apply_template<I>(&mut self, specs: I)
    where
        I: IntoIterator<Item = RowSpec>,
    {
        self.rows = materialize(specs, &mut HashSet::new());
    }

    /// Deep copy with every row and cell re-identified.
    pub fn duplicate(&self) -> Table {
        let mut taken = HashSet::new();
        let rows = self
            .rows
            .iter()
            .map(|row| Row {
                id: mint_id(&mut taken),
                cells: row
                    .cells
                    .iter()
                    .map(|cell| Cell {
                        id: mint_id(&mut taken),
                        ..cell.clone()
                    })
                    .collect(),
                is_header: row.is_header,
            })
            .collect();
        Table { rows }
    }

    fn row_index(&self, row_id: &str) -> Result<usize, TableError> {
        self.rows
            .iter()
            .position(|r| r.id == row_id)
            .ok_or_else(|| TableError::RowNotFound(row_id.to_string()))
    }

    fn row_mut(&mut self, row_id: &str) -> Result<&mut Row, TableError> {
        let index = self.row_index(row_id)?;
        Ok(&mut self.rows[index])
    }

    fn id_set(&self) -> HashSet<String> {
        self.rows
            .iter()
            .flat_map(|r| std::iter::once(r.id.clone()).chain(r.cells.iter().map(|c| c.id.clone())))
            .collect()
    }
}

/// Splits [`FULL_WIDTH`] into `count` shares rounded to two decimals; the last share takes
/// the remainder so the total stays exact (3 cells give 33.33, 33.33, 33.34).
pub fn equal_split(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let share = round2(FULL_WIDTH / count as f64);
    let mut sizes = vec![share; count];
    sizes[count - 1] = round2(FULL_WIDTH - share * (count - 1) as f64);
    sizes
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn cell_not_found(row_id: &str, cell_id: &str) -> TableError {
    TableError::CellNotFound {
        row_id: row_id.to_string(),
        cell_id: cell_id.to_string(),
    }
}

fn move_within<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), TableError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(TableError::IndexOutOfRange { index, len });
        }
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

fn mint_id(taken: &mut HashSet<String>) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if taken.insert(id.clone()) {
            return id;
        }
    }
}

fn materialize<I>(specs: I, taken: &mut HashSet<String>) -> Vec<Row>
where
    I: IntoIterator<Item = RowSpec>,
{
    specs
        .into_iter()
        .filter(|spec| !spec.cells.is_empty())
        .map(|spec| Row {
            id: mint_id(taken),
            cells: spec
                .cells
                .into_iter()
                .map(|c| Cell {
                    id: mint_id(taken),
                    content: c.content,
                    placeholder: c.placeholder,
                    size: c.size,
                })
                .collect(),
            is_header: spec.is_header.then_some(true),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cell(id: &str, size: f64) -> Cell {
        Cell {
            id: id.to_string(),
            content: String::new(),
            placeholder: String::new(),
            size,
        }
    }

    fn row(id: &str, cells: Vec<Cell>) -> Row {
        Row {
            id: id.to_string(),
            cells,
            is_header: None,
        }
    }

    fn table(rows: Vec<Row>) -> Table {
        Table::try_from(rows).expect("valid table")
    }

    fn sizes(table: &Table, row_id: &str) -> Vec<f64> {
        table
            .row(row_id)
            .expect("row")
            .cells
            .iter()
            .map(|c| c.size)
            .collect()
    }

    fn row_ids(table: &Table) -> Vec<&str> {
        table.rows().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn split_halves_cell_and_inserts_after_it() {
        let mut t = table(vec![row("R", vec![cell("A", 60.0), cell("B", 40.0)])]);
        let new_id = t.split_cell("R", "A", "New section").expect("split");

        let r = t.row("R").expect("row");
        let ids: Vec<&str> = r.cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A", new_id.as_str(), "B"]);
        assert_eq!(sizes(&t, "R"), vec![30.0, 30.0, 40.0]);
        assert_eq!(r.cells[1].content, "");
        assert_eq!(r.cells[1].placeholder, "New section");
        assert_ne!(new_id, "A");
    }

    #[test]
    fn merge_gives_width_to_previous_cell() {
        let mut t = table(vec![row(
            "R",
            vec![cell("A", 30.0), cell("A2", 30.0), cell("B", 40.0)],
        )]);
        t.merge_cell("R", "A2").expect("merge");
        let r = t.row("R").expect("row");
        assert_eq!(r.cells.len(), 2);
        assert_eq!(r.cells[0].id, "A");
        assert_eq!(sizes(&t, "R"), vec![60.0, 40.0]);
    }

    #[test]
    fn merge_first_cell_gives_width_to_next_cell() {
        let mut t = table(vec![row(
            "R",
            vec![cell("A", 20.0), cell("B", 30.0), cell("C", 50.0)],
        )]);
        t.merge_cell("R", "A").expect("merge");
        let r = t.row("R").expect("row");
        assert_eq!(r.cells[0].id, "B");
        assert_eq!(sizes(&t, "R"), vec![50.0, 50.0]);
    }

    #[test]
    fn merge_refuses_last_cell() {
        let mut t = table(vec![row("R", vec![cell("A", 100.0)])]);
        let before = t.clone();
        let e = t.merge_cell("R", "A").expect_err("refused");
        assert_eq!(e, TableError::LastCell("R".into()));
        assert_eq!(e.kind(), ErrorKind::Rejected);
        assert_eq!(t, before);
    }

    #[test]
    fn split_then_merge_restores_width_and_count() {
        let mut t = table(vec![row("R", vec![cell("A", 33.33), cell("B", 66.67)])]);
        let new_id = t.split_cell("R", "A", "").expect("split");
        t.merge_cell("R", &new_id).expect("merge");
        let s = sizes(&t, "R");
        assert_eq!(s.len(), 2);
        assert!((s[0] - 33.33).abs() < 1e-9);
    }

    #[test]
    fn move_row_forward_shifts_rows_between() {
        let mut t = table(vec![
            row("R1", vec![cell("a", 100.0)]),
            row("R2", vec![cell("b", 100.0)]),
            row("R3", vec![cell("c", 100.0)]),
        ]);
        t.move_row(0, 2).expect("move");
        assert_eq!(row_ids(&t), vec!["R2", "R3", "R1"]);
        t.move_row(2, 0).expect("move back");
        assert_eq!(row_ids(&t), vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn move_row_out_of_range_is_error() {
        let mut t = table(vec![
            row("R1", vec![cell("a", 100.0)]),
            row("R2", vec![cell("b", 100.0)]),
        ]);
        let e = t.move_row(0, 2).expect_err("out of range");
        assert_eq!(e, TableError::IndexOutOfRange { index: 2, len: 2 });
        assert_eq!(e.kind(), ErrorKind::OutOfRange);
        assert_eq!(row_ids(&t), vec!["R1", "R2"]);
    }

    #[test]
    fn move_cell_reorders_within_row_only() {
        let mut t = table(vec![
            row("R1", vec![cell("a", 50.0), cell("b", 25.0), cell("c", 25.0)]),
            row("R2", vec![cell("d", 50.0), cell("e", 50.0)]),
        ]);
        t.move_cell("R1", 2, 0).expect("move");
        let ids: Vec<&str> = t.row("R1").unwrap().cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(t.row("R2").unwrap().cells[0].id, "d");
        assert!(t.move_cell("R2", 0, 5).is_err());
        assert!(matches!(
            t.move_cell("missing", 0, 1),
            Err(TableError::RowNotFound(_))
        ));
    }

    #[test]
    fn resize_with_wrong_length_leaves_row_unchanged() {
        let mut t = table(vec![row(
            "R2",
            vec![cell("a", 30.0), cell("b", 30.0), cell("c", 40.0)],
        )]);
        let e = t.resize_row("R2", &[10.0, 20.0]).expect_err("mismatch");
        assert_eq!(
            e,
            TableError::SizeCountMismatch {
                expected: 3,
                got: 2
            }
        );
        assert_eq!(sizes(&t, "R2"), vec![30.0, 30.0, 40.0]);
    }

    #[test]
    fn resize_does_not_renormalize() {
        let mut t = table(vec![row("R", vec![cell("a", 50.0), cell("b", 50.0)])]);
        t.resize_row("R", &[70.0, 40.0]).expect("resize");
        assert_eq!(sizes(&t, "R"), vec![70.0, 40.0]);
        assert!((t.row("R").unwrap().width_total() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn add_row_mirrors_reference_row_cell_count() {
        let mut t = table(vec![
            row("R1", vec![cell("a", 25.0), cell("b", 50.0), cell("c", 25.0)]),
            row("R2", vec![cell("d", 100.0)]),
        ]);
        let id = t.add_row(Some(0), "New section");
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows()[1].id, id);
        assert_eq!(sizes(&t, &id), vec![33.33, 33.33, 33.34]);
        assert!(t.rows()[1].cells.iter().all(|c| c.content.is_empty()));
    }

    #[test]
    fn add_row_without_reference_appends_single_cell() {
        let mut t = table(vec![row("R1", vec![cell("a", 50.0), cell("b", 50.0)])]);
        let id = t.add_row(None, "New section");
        assert_eq!(row_ids(&t), vec!["R1", id.as_str()]);
        assert_eq!(sizes(&t, &id), vec![100.0]);

        let id2 = t.add_row(Some(99), "New section");
        assert_eq!(t.rows()[2].id, id2);
        assert_eq!(t.rows()[2].cells.len(), 1);
    }

    #[test]
    fn remove_row_removes_exactly_one() {
        let mut t = table(vec![
            row("R1", vec![cell("a", 100.0)]),
            row("R2", vec![cell("b", 100.0)]),
            row("R3", vec![cell("c", 100.0)]),
        ]);
        let removed = t.remove_row("R2").expect("remove");
        assert_eq!(removed.id, "R2");
        assert_eq!(row_ids(&t), vec!["R1", "R3"]);
        assert!(matches!(t.remove_row("R2"), Err(TableError::RowNotFound(_))));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn not_found_edits_leave_table_unchanged() {
        let mut t = table(vec![row("R", vec![cell("A", 60.0), cell("B", 40.0)])]);
        let before = t.clone();
        let e = t.split_cell("R", "nope", "").expect_err("missing cell");
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert!(t.merge_cell("nope", "A").is_err());
        assert!(t.update_cell_content("R", "nope", "<p>x</p>").is_err());
        assert_eq!(t, before);
    }

    #[test]
    fn update_cell_content_is_verbatim() {
        let mut t = table(vec![row("R", vec![cell("A", 100.0)])]);
        t.update_cell_content("R", "A", "<p><script>x</script></p>")
            .expect("update");
        assert_eq!(t.rows()[0].cells[0].content, "<p><script>x</script></p>");
    }

    #[test]
    fn apply_template_replaces_everything() {
        let mut t = table(vec![row("R", vec![cell("A", 100.0)])]);
        t.apply_template(vec![
            RowSpec::new(vec![CellSpec::new("<strong>Materials:</strong>", "List", 100.0)]),
            RowSpec::new(Vec::new()),
            RowSpec::header(vec![
                CellSpec::new("a", "", 50.0),
                CellSpec::new("b", "", 50.0),
            ]),
        ]);
        assert_eq!(t.len(), 2);
        assert!(t.row("R").is_none());
        assert_eq!(t.rows()[1].is_header, Some(true));
        assert_eq!(t.rows()[0].is_header, None);
        t.validate().expect("valid");
    }

    #[test]
    fn deserialize_rejects_empty_rows_and_duplicate_ids() {
        let empty = serde_json::json!([{ "id": "R", "cells": [] }]);
        assert!(serde_json::from_value::<Table>(empty).is_err());

        let dup = serde_json::json!([
            { "id": "R", "cells": [{ "id": "X", "content": "", "placeholder": "", "size": 100 }] },
            { "id": "X", "cells": [{ "id": "Y", "content": "", "placeholder": "", "size": 100 }] }
        ]);
        assert!(serde_json::from_value::<Table>(dup).is_err());
    }

    #[test]
    fn serializes_in_wire_shape() {
        let t = table(vec![Row {
            id: "R".into(),
            cells: vec![cell("A", 100.0)],
            is_header: Some(true),
        }]);
        let v = serde_json::to_value(&t).expect("serialize");
        assert_eq!(
            v,
            serde_json::json!([{
                "id": "R",
                "isHeader": true,
                "cells": [{ "id": "A", "content": "", "placeholder": "", "size": 100.0 }]
            }])
        );
    }

    #[test]
    fn duplicate_reassigns_every_id() {
        let t = table(vec![row("R", vec![cell("A", 60.0), cell("B", 40.0)])]);
        let copy = t.duplicate();
        assert_eq!(copy.len(), 1);
        assert_ne!(copy.rows()[0].id, "R");
        assert!(copy.rows()[0].cells.iter().all(|c| c.id != "A" && c.id != "B"));
        assert_eq!(sizes(&copy, &copy.rows()[0].id.clone()), vec![60.0, 40.0]);
    }

    #[test]
    fn equal_split_sums_to_full_width() {
        for n in 1..12 {
            let total: f64 = equal_split(n).iter().sum();
            assert!((total - FULL_WIDTH).abs() < 1e-9, "n={n}");
        }
        assert!(equal_split(0).is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Option<usize>),
        Remove(usize),
        MoveRow(usize, usize),
        Split(usize, usize),
        Merge(usize, usize),
        MoveCell(usize, usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::option::of(0usize..8).prop_map(Op::Add),
            (0usize..8).prop_map(Op::Remove),
            (0usize..8, 0usize..8).prop_map(|(a, b)| Op::MoveRow(a, b)),
            (0usize..8, 0usize..8).prop_map(|(a, b)| Op::Split(a, b)),
            (0usize..8, 0usize..8).prop_map(|(a, b)| Op::Merge(a, b)),
            (0usize..8, 0usize..8, 0usize..8).prop_map(|(a, b, c)| Op::MoveCell(a, b, c)),
        ]
    }

    fn pick_cell(t: &Table, r: usize, c: usize) -> Option<(String, String)> {
        let row = t.rows().get(r)?;
        let cell = row.cells.get(c % row.cells.len())?;
        Some((row.id.clone(), cell.id.clone()))
    }

    fn apply(t: &mut Table, op: &Op) {
        match op {
            Op::Add(at) => {
                t.add_row(*at, "New section");
            }
            Op::Remove(r) => {
                if let Some(id) = t.rows().get(*r).map(|row| row.id.clone()) {
                    t.remove_row(&id).expect("remove existing row");
                }
            }
            Op::MoveRow(a, b) => {
                let _ = t.move_row(*a, *b);
            }
            Op::Split(r, c) => {
                if let Some((row_id, cell_id)) = pick_cell(t, *r, *c) {
                    t.split_cell(&row_id, &cell_id, "").expect("split existing cell");
                }
            }
            Op::Merge(r, c) => {
                if let Some((row_id, cell_id)) = pick_cell(t, *r, *c) {
                    let _ = t.merge_cell(&row_id, &cell_id);
                }
            }
            Op::MoveCell(r, a, b) => {
                if let Some(id) = t.rows().get(*r).map(|row| row.id.clone()) {
                    let _ = t.move_cell(&id, *a, *b);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn structural_edits_keep_table_well_formed(ops in proptest::collection::vec(op(), 0..40)) {
            let mut t = Table::from_specs(vec![
                RowSpec::new(vec![
                    CellSpec::new("", "", 33.33),
                    CellSpec::new("", "", 33.33),
                    CellSpec::new("", "", 33.34),
                ]),
                RowSpec::new(vec![CellSpec::new("", "", 100.0)]),
            ]);
            for op in &ops {
                apply(&mut t, op);
                prop_assert!(t.validate().is_ok());
                for row in t.rows() {
                    prop_assert!(!row.cells.is_empty());
                    prop_assert!((row.width_total() - FULL_WIDTH).abs() < 1e-6);
                }
            }
        }

        #[test]
        fn move_row_round_trip_restores_order(n in 1usize..8, i in 0usize..8, j in 0usize..8) {
            let specs = (0..n).map(|_| RowSpec::new(vec![CellSpec::new("", "", 100.0)]));
            let mut t = Table::from_specs(specs);
            let (i, j) = (i % n, j % n);
            let before: Vec<String> = t.rows().iter().map(|r| r.id.clone()).collect();
            t.move_row(i, j).expect("move");
            t.move_row(j, i).expect("move back");
            let after: Vec<String> = t.rows().iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn split_then_merge_restores_sizes(n in 1usize..6, pos in 0usize..6, width in 1.0f64..100.0) {
            let mut specs: Vec<CellSpec> = equal_split(n)
                .into_iter()
                .map(|s| CellSpec::new("", "", s))
                .collect();
            let pos = pos % n;
            specs[pos].size = width;
            let mut t = Table::from_specs(vec![RowSpec::new(specs)]);
            let row_id = t.rows()[0].id.clone();
            let cell_id = t.rows()[0].cells[pos].id.clone();
            let before: Vec<f64> = t.rows()[0].cells.iter().map(|c| c.size).collect();

            let new_id = t.split_cell(&row_id, &cell_id, "").expect("split");
            prop_assert_eq!(t.rows()[0].cells.len(), n + 1);
            t.merge_cell(&row_id, &new_id).expect("merge");

            let after: Vec<f64> = t.rows()[0].cells.iter().map(|c| c.size).collect();
            prop_assert_eq!(after.len(), before.len());
            for (a, b) in after.iter().zip(&before) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
