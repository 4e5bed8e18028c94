//! `Matrix<V>`: a two-key-axis container with four uniqueness flavors. Keeps
//! a `forward` index (row -> columns present in that row) and a `transposed`
//! index (col -> rows present in that column) alongside the cell map itself,
//! the same shape the original engine's `LightweightMatrixStorage<T>` uses
//! its forward/transposed maps for -- so a lookup by either axis never scans
//! the whole container.
//!
//! Uniqueness is enforced by eviction: adding a cell that would violate the
//! declared `Multiplicity` first deletes whichever existing cell is in the
//! way, emitting that deletion as its own mutation strictly before the
//! insert's own `Updated` mutation.

use std::collections::HashMap;

use super::{MatrixEntry, Multiplicity};
use crate::clock::Us;

#[derive(Debug, Clone)]
pub enum MatrixEvent<V: MatrixEntry> {
    Updated { us: Us, data: V },
    Deleted { us: Us, row: V::Row, col: V::Col },
}

#[derive(Debug, Clone)]
pub struct MatrixUndo<V: MatrixEntry> {
    row: V::Row,
    col: V::Col,
    prior: Option<(V, Us)>,
}

pub struct Matrix<V: MatrixEntry> {
    multiplicity: Multiplicity,
    row_ordered: bool,
    col_ordered: bool,
    cells: HashMap<(V::Row, V::Col), V>,
    row_index: HashMap<V::Row, Vec<V::Col>>,
    col_index: HashMap<V::Col, Vec<V::Row>>,
    last_modified: HashMap<(V::Row, V::Col), Us>,
}

impl<V: MatrixEntry> Matrix<V> {
    pub fn new(multiplicity: Multiplicity, row_ordered: bool, col_ordered: bool) -> Self {
        Matrix {
            multiplicity,
            row_ordered,
            col_ordered,
            cells: HashMap::new(),
            row_index: HashMap::new(),
            col_index: HashMap::new(),
            last_modified: HashMap::new(),
        }
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn get(&self, row: &V::Row, col: &V::Col) -> Option<&V> {
        self.cells.get(&(row.clone(), col.clone()))
    }

    pub fn has(&self, row: &V::Row, col: &V::Col) -> bool {
        self.cells.contains_key(&(row.clone(), col.clone()))
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn last_modified(&self, row: &V::Row, col: &V::Col) -> Option<Us> {
        self.last_modified.get(&(row.clone(), col.clone())).copied()
    }

    /// Distinct row keys currently present, sorted if the row axis is
    /// declared ordered, in index order otherwise.
    pub fn rows(&self) -> Vec<V::Row> {
        let mut rows: Vec<V::Row> = self.row_index.keys().cloned().collect();
        if self.row_ordered {
            rows.sort();
        }
        rows
    }

    /// Distinct column keys currently present, sorted if the column axis is
    /// declared ordered, in index order otherwise.
    pub fn cols(&self) -> Vec<V::Col> {
        let mut cols: Vec<V::Col> = self.col_index.keys().cloned().collect();
        if self.col_ordered {
            cols.sort();
        }
        cols
    }

    pub fn row_cells(&self, row: &V::Row) -> Vec<&V> {
        let mut cols = self.row_index.get(row).cloned().unwrap_or_default();
        if self.col_ordered {
            cols.sort();
        }
        cols.iter().filter_map(|col| self.cells.get(&(row.clone(), col.clone()))).collect()
    }

    pub fn col_cells(&self, col: &V::Col) -> Vec<&V> {
        let mut rows = self.col_index.get(col).cloned().unwrap_or_default();
        if self.row_ordered {
            rows.sort();
        }
        rows.iter().filter_map(|row| self.cells.get(&(row.clone(), col.clone()))).collect()
    }

    fn index_insert(&mut self, row: V::Row, col: V::Col) {
        let cols = self.row_index.entry(row.clone()).or_default();
        if !cols.contains(&col) {
            cols.push(col.clone());
        }
        let rows = self.col_index.entry(col).or_default();
        if !rows.contains(&row) {
            rows.push(row);
        }
    }

    fn index_remove(&mut self, row: &V::Row, col: &V::Col) {
        if let Some(cols) = self.row_index.get_mut(row) {
            cols.retain(|c| c != col);
            if cols.is_empty() {
                self.row_index.remove(row);
            }
        }
        if let Some(rows) = self.col_index.get_mut(col) {
            rows.retain(|r| r != row);
            if rows.is_empty() {
                self.col_index.remove(col);
            }
        }
    }

    fn raw_put(&mut self, entry: V, us: Us) -> Option<(V, Us)> {
        let row = entry.row();
        let col = entry.col();
        let prior_us = self.last_modified(&row, &col);
        let prior_value = self.cells.insert((row.clone(), col.clone()), entry);
        self.index_insert(row.clone(), col.clone());
        self.last_modified.insert((row, col), us);
        prior_value.zip(prior_us)
    }

    fn raw_take(&mut self, row: &V::Row, col: &V::Col) -> Option<V> {
        let removed = self.cells.remove(&(row.clone(), col.clone()));
        if removed.is_some() {
            self.index_remove(row, col);
        }
        removed
    }

    /// Finds the single cell occupying `row`, if the row axis is currently
    /// constrained to at most one cell by the declared multiplicity.
    fn only_cell_in_row(&self, row: &V::Row) -> Option<(V::Row, V::Col)> {
        let cols = self.row_index.get(row)?;
        cols.first().map(|col| (row.clone(), col.clone()))
    }

    fn only_cell_in_col(&self, col: &V::Col) -> Option<(V::Row, V::Col)> {
        let rows = self.col_index.get(col)?;
        rows.first().map(|row| (row.clone(), col.clone()))
    }

    /// Evicts the cell at `(row, col)`. The last-modified stamp is recorded
    /// unconditionally, even when the cell was already absent; only the
    /// `MatrixEvent`/`MatrixUndo` pair is elided in that case.
    fn evict(&mut self, row: &V::Row, col: &V::Col, us: Us) -> Option<(MatrixEvent<V>, MatrixUndo<V>)> {
        let prior_us = self.last_modified(row, col);
        let removed = self.raw_take(row, col);
        self.last_modified.insert((row.clone(), col.clone()), us);
        let removed = removed?;
        Some((
            MatrixEvent::Deleted { us, row: row.clone(), col: col.clone() },
            MatrixUndo { row: row.clone(), col: col.clone(), prior: Some((removed, prior_us.unwrap_or(us))) },
        ))
    }

    /// Inserts `entry`, first evicting whichever existing cells the declared
    /// multiplicity forbids coexisting with it. Evictions are returned ahead
    /// of the final `Updated` event, in row-then-column order. `next_us` is
    /// called once per emitted event -- each eviction, then the insert --
    /// so a single `add` call that evicts two cells and inserts one produces
    /// three strictly increasing timestamps, never one timestamp shared
    /// across the whole call.
    pub fn add(
        &mut self,
        entry: V,
        mut next_us: impl FnMut() -> Us,
    ) -> (Vec<MatrixEvent<V>>, Vec<MatrixUndo<V>>) {
        let row = entry.row();
        let col = entry.col();
        let mut events = Vec::new();
        let mut undos = Vec::new();

        let evicts_row = matches!(self.multiplicity, Multiplicity::ManyToOne | Multiplicity::OneToOne);
        let evicts_col = matches!(self.multiplicity, Multiplicity::OneToMany | Multiplicity::OneToOne);

        if evicts_row {
            if let Some((r, c)) = self.only_cell_in_row(&row) {
                if c != col {
                    if let Some((event, undo)) = self.evict(&r, &c, next_us()) {
                        events.push(event);
                        undos.push(undo);
                    }
                }
            }
        }
        if evicts_col {
            if let Some((r, c)) = self.only_cell_in_col(&col) {
                if r != row {
                    if let Some((event, undo)) = self.evict(&r, &c, next_us()) {
                        events.push(event);
                        undos.push(undo);
                    }
                }
            }
        }

        let us = next_us();
        let prior = self.raw_put(entry.clone(), us);
        events.push(MatrixEvent::Updated { us, data: entry });
        undos.push(MatrixUndo { row, col, prior });

        (events, undos)
    }

    /// Erases the cell at `(row, col)`. See `evict` for the last-modified
    /// stamping behavior when the cell was already absent.
    pub fn erase(&mut self, row: &V::Row, col: &V::Col, us: Us) -> Option<(MatrixEvent<V>, MatrixUndo<V>)> {
        self.evict(row, col, us)
    }

    pub fn apply_undo(&mut self, undo: MatrixUndo<V>) {
        match undo.prior {
            Some((value, us)) => {
                self.cells.insert((undo.row.clone(), undo.col.clone()), value);
                self.index_insert(undo.row.clone(), undo.col.clone());
                self.last_modified.insert((undo.row, undo.col), us);
            }
            None => {
                self.raw_take(&undo.row, &undo.col);
                self.last_modified.remove(&(undo.row, undo.col));
            }
        }
    }

    pub fn apply_event(&mut self, event: MatrixEvent<V>) {
        match event {
            MatrixEvent::Updated { us, data } => {
                self.raw_put(data, us);
            }
            MatrixEvent::Deleted { us, row, col } => {
                self.raw_take(&row, &col);
                self.last_modified.insert((row, col), us);
            }
        }
    }
}
