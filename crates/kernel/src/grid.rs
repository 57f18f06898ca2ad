use std::collections::{BTreeMap, BTreeSet};

use bendsim_common::EntityId;
use glam::DVec3;

/// A 2D cell coordinate in the entity grid (ignoring Y axis for partitioning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Fixed-size XZ grid over entity bounding boxes.
///
/// An entity is placed in every cell its box overlaps, so a box query only
/// has to visit the cells the query region overlaps. Results are id-ordered.
#[derive(Debug, Clone)]
pub struct GridPartition {
    cell_size: f64,
    cells: BTreeMap<CellCoord, BTreeSet<EntityId>>,
    placements: BTreeMap<EntityId, (CellCoord, CellCoord)>,
}

impl GridPartition {
    /// # Panics
    /// If `cell_size` is not a positive finite number.
    pub fn new(cell_size: f64) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell_size must be positive"
        );
        Self {
            cell_size,
            cells: BTreeMap::new(),
            placements: BTreeMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn position_to_cell(&self, pos: DVec3) -> CellCoord {
        CellCoord {
            x: (pos.x / self.cell_size).floor() as i32,
            z: (pos.z / self.cell_size).floor() as i32,
        }
    }

    /// Place (or re-place) an entity covering `[min, max]`.
    pub fn insert(&mut self, id: EntityId, min: DVec3, max: DVec3) {
        let range = (self.position_to_cell(min), self.position_to_cell(max));
        if self.placements.get(&id) == Some(&range) {
            return;
        }
        self.remove(id);
        for coord in cells_between(range.0, range.1) {
            self.cells.entry(coord).or_default().insert(id);
        }
        self.placements.insert(id, range);
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some((lo, hi)) = self.placements.remove(&id) else {
            return false;
        };
        for coord in cells_between(lo, hi) {
            if let Some(set) = self.cells.get_mut(&coord) {
                set.remove(&id);
                if set.is_empty() {
                    self.cells.remove(&coord);
                }
            }
        }
        true
    }

    /// Candidate entities whose cells overlap `[min, max]`. The caller does
    /// the exact box test.
    pub fn candidates(&self, min: DVec3, max: DVec3) -> BTreeSet<EntityId> {
        let lo = self.position_to_cell(min);
        let hi = self.position_to_cell(max);
        let mut result = BTreeSet::new();
        for coord in cells_between(lo, hi) {
            if let Some(entities) = self.cells.get(&coord) {
                result.extend(entities.iter().copied());
            }
        }
        result
    }

    pub fn entities_in_cell(&self, coord: CellCoord) -> BTreeSet<EntityId> {
        self.cells.get(&coord).cloned().unwrap_or_default()
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Total number of entity placements across all cells.
    pub fn total_placements(&self) -> usize {
        self.cells.values().map(|s| s.len()).sum()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.placements.clear();
    }
}

fn cells_between(lo: CellCoord, hi: CellCoord) -> impl Iterator<Item = CellCoord> {
    (lo.x..=hi.x).flat_map(move |x| (lo.z..=hi.z).map(move |z| CellCoord::new(x, z)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_box(x: f64, z: f64) -> (DVec3, DVec3) {
        let c = DVec3::new(x, 64.0, z);
        (c - DVec3::splat(0.3), c + DVec3::splat(0.3))
    }

    #[test]
    fn position_to_cell_basic() {
        let grid = GridPartition::new(16.0);
        let coord = grid.position_to_cell(DVec3::new(10.0, 0.0, 10.0));
        assert_eq!(coord, CellCoord::new(0, 0));

        let coord = grid.position_to_cell(DVec3::new(20.0, 0.0, -5.0));
        assert_eq!(coord, CellCoord::new(1, -1));
    }

    #[test]
    fn box_straddling_a_border_lands_in_both_cells() {
        let mut grid = GridPartition::new(16.0);
        let id = EntityId::new();
        let (min, max) = point_box(16.0, 5.0);
        grid.insert(id, min, max);
        assert_eq!(grid.cell_count(), 2);
        assert!(grid.entities_in_cell(CellCoord::new(0, 0)).contains(&id));
        assert!(grid.entities_in_cell(CellCoord::new(1, 0)).contains(&id));
    }

    #[test]
    fn reinsert_moves_entity() {
        let mut grid = GridPartition::new(16.0);
        let id = EntityId::new();
        let (min, max) = point_box(1.0, 1.0);
        grid.insert(id, min, max);
        let (min, max) = point_box(40.0, 1.0);
        grid.insert(id, min, max);
        assert!(grid.entities_in_cell(CellCoord::new(0, 0)).is_empty());
        assert!(grid.entities_in_cell(CellCoord::new(2, 0)).contains(&id));
        assert_eq!(grid.total_placements(), 1);
    }

    #[test]
    fn candidates_only_from_overlapped_cells() {
        let mut grid = GridPartition::new(16.0);
        let near = EntityId::new();
        let far = EntityId::new();
        let (min, max) = point_box(2.0, 2.0);
        grid.insert(near, min, max);
        let (min, max) = point_box(200.0, 2.0);
        grid.insert(far, min, max);

        let found = grid.candidates(DVec3::new(-5.0, 60.0, -5.0), DVec3::new(5.0, 70.0, 5.0));
        assert!(found.contains(&near));
        assert!(!found.contains(&far));
    }

    #[test]
    fn remove_cleans_empty_cells() {
        let mut grid = GridPartition::new(16.0);
        let id = EntityId::new();
        let (min, max) = point_box(1.0, 1.0);
        grid.insert(id, min, max);
        assert!(grid.remove(id));
        assert!(!grid.remove(id));
        assert_eq!(grid.cell_count(), 0);
    }
}
