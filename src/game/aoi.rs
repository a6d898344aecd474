//! Area-of-interest grid
//!
//! Splits the bounded world plane into a fixed `rows x columns` array of
//! cells. Cell ids are row-major: `gid = row * columns + col`, with the column
//! taken from X and the row from Z. A player's view is the 3x3 block of cells
//! around the cell it stands in, clamped at the grid edges.
//!
//! The layout never changes after construction; only the occupant sets do,
//! and each cell guards its own set so movement in different cells never
//! contends.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::config::AoiConfig;
use crate::error::GameError;
use crate::game::player::PlayerId;

/// Row-major cell index
pub type CellId = usize;

/// One cell of the grid
#[derive(Debug)]
pub struct Cell {
    id: CellId,
    min_x: f32,
    max_x: f32,
    min_z: f32,
    max_z: f32,
    occupants: RwLock<HashSet<PlayerId>>,
}

impl Cell {
    fn new(id: CellId, min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Self {
        Self {
            id,
            min_x,
            max_x,
            min_z,
            max_z,
            occupants: RwLock::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    /// `(min_x, max_x, min_z, max_z)`
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (self.min_x, self.max_x, self.min_z, self.max_z)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.occupants.read().contains(&id)
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.read().len()
    }

    /// Snapshot of the occupant ids
    pub fn occupants(&self) -> Vec<PlayerId> {
        self.occupants.read().iter().copied().collect()
    }

    fn add(&self, id: PlayerId) -> bool {
        self.occupants.write().insert(id)
    }

    fn remove(&self, id: PlayerId) -> bool {
        self.occupants.write().remove(&id)
    }
}

/// Uniform spatial grid over the world plane
#[derive(Debug)]
pub struct AoiGrid {
    layout: AoiConfig,
    cell_width: f32,
    cell_height: f32,
    cells: Vec<Cell>,
}

impl AoiGrid {
    /// Build a grid, rejecting empty or inverted layouts
    pub fn new(layout: AoiConfig) -> Result<Self, GameError> {
        if layout.columns == 0 || layout.rows == 0 {
            return Err(GameError::InvalidGrid(format!(
                "{} columns x {} rows",
                layout.columns, layout.rows
            )));
        }
        let bounds = [layout.min_x, layout.max_x, layout.min_z, layout.max_z];
        let finite = bounds.iter().all(|v| v.is_finite());
        if !finite || !(layout.max_x > layout.min_x) || !(layout.max_z > layout.min_z) {
            return Err(GameError::InvalidGrid(format!(
                "bounds x {}..{} z {}..{}",
                layout.min_x, layout.max_x, layout.min_z, layout.max_z
            )));
        }

        let cell_width = (layout.max_x - layout.min_x) / layout.columns as f32;
        let cell_height = (layout.max_z - layout.min_z) / layout.rows as f32;

        let mut cells = Vec::with_capacity(layout.columns * layout.rows);
        for row in 0..layout.rows {
            for col in 0..layout.columns {
                let min_x = layout.min_x + col as f32 * cell_width;
                let min_z = layout.min_z + row as f32 * cell_height;
                cells.push(Cell::new(
                    row * layout.columns + col,
                    min_x,
                    min_x + cell_width,
                    min_z,
                    min_z + cell_height,
                ));
            }
        }

        Ok(Self {
            layout,
            cell_width,
            cell_height,
            cells,
        })
    }

    pub fn columns(&self) -> usize {
        self.layout.columns
    }

    pub fn rows(&self) -> usize {
        self.layout.rows
    }

    /// `(width, height)` of every cell
    pub fn cell_size(&self) -> (f32, f32) {
        (self.cell_width, self.cell_height)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, gid: CellId) -> Option<&Cell> {
        self.cells.get(gid)
    }

    /// Cell covering `(x, z)` after clamping into the grid bounds
    ///
    /// NaN coordinates land on the low edge.
    pub fn cell_id_for(&self, x: f32, z: f32) -> CellId {
        let col = axis_index(x, self.layout.min_x, self.cell_width, self.layout.columns);
        let row = axis_index(z, self.layout.min_z, self.cell_height, self.layout.rows);
        row * self.layout.columns + col
    }

    /// The cell itself plus its in-range neighbors, in row-major order
    ///
    /// Unknown ids yield an empty list.
    pub fn neighborhood_of(&self, gid: CellId) -> Vec<CellId> {
        if gid >= self.cells.len() {
            return Vec::new();
        }

        let columns = self.layout.columns;
        let row = gid / columns;
        let col = gid % columns;

        let row_range = row.saturating_sub(1)..=(row + 1).min(self.layout.rows - 1);
        let col_range = col.saturating_sub(1)..=(col + 1).min(columns - 1);

        let mut cells = Vec::with_capacity(9);
        for r in row_range {
            for c in col_range.clone() {
                cells.push(r * columns + c);
            }
        }
        cells
    }

    /// Occupants of exactly one cell; unknown ids yield an empty list
    pub fn occupants_of(&self, gid: CellId) -> Vec<PlayerId> {
        self.cells
            .get(gid)
            .map(Cell::occupants)
            .unwrap_or_default()
    }

    /// Union of the occupants of every cell in the neighborhood of `gid`
    pub fn occupants_around(&self, gid: CellId) -> Vec<PlayerId> {
        self.neighborhood_of(gid)
            .into_iter()
            .flat_map(|cell| self.occupants_of(cell))
            .collect()
    }

    /// Add `id` to the cell covering `(x, z)`
    pub fn insert(&self, id: PlayerId, x: f32, z: f32) -> CellId {
        let gid = self.cell_id_for(x, z);
        self.insert_at(id, gid);
        gid
    }

    /// Add `id` to a specific cell; `false` for unknown ids
    pub fn insert_at(&self, id: PlayerId, gid: CellId) -> bool {
        match self.cells.get(gid) {
            Some(cell) => {
                cell.add(id);
                true
            }
            None => false,
        }
    }

    /// Remove `id` from the named cell
    pub fn remove(&self, id: PlayerId, gid: CellId) -> bool {
        self.cells.get(gid).map_or(false, |cell| cell.remove(id))
    }

    /// Remove `id` from whichever cell holds it, scanning the whole grid
    ///
    /// Only for recovery when the owning cell is no longer known.
    pub fn evict(&self, id: PlayerId) -> Option<CellId> {
        self.cells
            .iter()
            .find(|cell| cell.remove(id))
            .map(Cell::id)
    }

    /// Move `id` between cells; a no-op when both ids match
    pub fn move_between(&self, id: PlayerId, old_gid: CellId, new_gid: CellId) {
        if old_gid == new_gid {
            return;
        }
        self.remove(id, old_gid);
        self.insert_at(id, new_gid);
    }

    /// Total occupants over all cells
    pub fn population(&self) -> usize {
        self.cells.iter().map(Cell::occupant_count).sum()
    }

    /// Number of cells with at least one occupant
    pub fn populated_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.occupant_count() > 0)
            .count()
    }
}

fn axis_index(value: f32, min: f32, cell_size: f32, count: usize) -> usize {
    if !(value > min) {
        return 0;
    }
    let index = ((value - min) / cell_size) as usize;
    index.min(count - 1)
}
