//! The tile graph.
//!
//! Tiles live in a slot arena and are linked through a fixed neighbor table.
//! [`TileGraph::set_neighbor`] is the only function that writes edges, and
//! it keeps spatial edges reciprocal: if A has B to the east, B has A to the
//! west. Teleport edges are one-way and exempt.

use std::collections::BTreeMap;

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::occupant::OccupantId;
use crate::tile::{AxialCoord, GridCoord, Tile, TileId, TileKind};

/// Arena of tiles plus a coordinate index.
#[derive(Debug, Clone, Default)]
pub struct TileGraph {
    tiles: SlotMap<TileId, Tile>,
    by_coord: BTreeMap<GridCoord, TileId>,
}

impl TileGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an unlinked tile at `coord`.
    pub fn add_tile(&mut self, coord: GridCoord, kind: TileKind) -> Result<TileId> {
        if self.by_coord.contains_key(&coord) {
            warn!(?coord, "Rejected tile insert: coordinate already taken");
            return Err(GridError::CoordinateTaken {
                row: coord.row,
                column: coord.column,
            });
        }
        let id = self.tiles.insert(Tile::new(coord, kind));
        self.by_coord.insert(coord, id);
        Ok(id)
    }

    /// Look up a tile.
    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    /// Look up a tile, failing with [`GridError::UnknownTile`].
    pub fn try_tile(&self, id: TileId) -> Result<&Tile> {
        self.tiles.get(id).ok_or(GridError::UnknownTile(id))
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Result<&mut Tile> {
        self.tiles.get_mut(id).ok_or(GridError::UnknownTile(id))
    }

    /// Whether the handle refers to a live tile.
    #[must_use]
    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(id)
    }

    /// Tile at a row/column coordinate.
    #[must_use]
    pub fn tile_at(&self, coord: GridCoord) -> Option<TileId> {
        self.by_coord.get(&coord).copied()
    }

    /// Tile at an axial coordinate.
    #[must_use]
    pub fn tile_at_axial(&self, axial: AxialCoord) -> Option<TileId> {
        self.tile_at(axial.to_grid())
    }

    /// Number of live tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile handles ordered by row, then column.
    pub fn tile_ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.by_coord.values().copied()
    }

    /// Tiles ordered by row, then column.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> + '_ {
        self.by_coord
            .values()
            .filter_map(|&id| self.tiles.get(id).map(|tile| (id, tile)))
    }

    /// Neighbor of `tile` in `direction`.
    #[must_use]
    pub fn neighbor(&self, tile: TileId, direction: Direction) -> Option<TileId> {
        self.tiles.get(tile).and_then(|t| t.neighbor(direction))
    }

    /// Write one edge.
    ///
    /// For spatial directions the reciprocal edge is written too, and any
    /// edge either endpoint previously had in the affected slots is
    /// unlinked on both sides. `None` clears the edge and its reciprocal.
    pub fn set_neighbor(
        &mut self,
        tile: TileId,
        direction: Direction,
        neighbor: Option<TileId>,
    ) -> Result<()> {
        if !self.tiles.contains_key(tile) {
            warn!(?tile, ?direction, "Rejected edge write: unknown tile");
            return Err(GridError::UnknownTile(tile));
        }
        if let Some(other) = neighbor {
            if other == tile {
                warn!(?tile, ?direction, "Rejected edge write: self link");
                return Err(GridError::SelfLink { tile, direction });
            }
            if !self.tiles.contains_key(other) {
                warn!(?tile, ?direction, ?other, "Rejected edge write: unknown neighbor");
                return Err(GridError::UnknownTile(other));
            }
        }

        if !direction.is_spatial() {
            self.tile_mut(tile)?.set_neighbor_slot(direction, neighbor);
            return Ok(());
        }

        let opposite = direction.opposite();
        let previous = self.neighbor(tile, direction);

        if let Some(old) = previous.filter(|&old| Some(old) != neighbor) {
            self.clear_slot_if(old, opposite, tile);
        }

        if let Some(other) = neighbor {
            if let Some(stale) = self.neighbor(other, opposite).filter(|&s| s != tile) {
                self.clear_slot_if(stale, direction, other);
            }
            self.tile_mut(other)?.set_neighbor_slot(opposite, Some(tile));
        }
        self.tile_mut(tile)?.set_neighbor_slot(direction, neighbor);

        #[cfg(feature = "debug-validation")]
        debug_assert!(self.check_reciprocity().is_ok());

        Ok(())
    }

    /// Clear `tile`'s slot `direction` if it currently points at `expected`.
    fn clear_slot_if(&mut self, tile: TileId, direction: Direction, expected: TileId) {
        if let Some(t) = self.tiles.get_mut(tile) {
            if t.neighbor(direction) == Some(expected) {
                t.set_neighbor_slot(direction, None);
            }
        }
    }

    /// Remove a tile and every edge that touches it.
    ///
    /// Returns the occupant the tile held, whose back reference the caller
    /// must clear.
    pub fn remove_tile(&mut self, tile: TileId) -> Result<Option<OccupantId>> {
        let Some(removed) = self.tiles.remove(tile) else {
            warn!(?tile, "Rejected tile removal: unknown tile");
            return Err(GridError::UnknownTile(tile));
        };
        self.by_coord.remove(&removed.coord());

        for direction in Direction::CARDINAL {
            if let Some(other) = removed.neighbor(direction) {
                self.clear_slot_if(other, direction.opposite(), tile);
            }
        }
        for other in self.tiles.values_mut() {
            if other.neighbor(Direction::Teleport) == Some(tile) {
                other.set_neighbor_slot(Direction::Teleport, None);
            }
        }

        Ok(removed.occupant())
    }

    /// Which slot of `from` holds `to`.
    ///
    /// Spatial slots are checked before the Teleport slot.
    pub fn direction_between(&self, from: TileId, to: TileId) -> Result<Direction> {
        let tile = self.try_tile(from)?;
        Direction::ALL
            .into_iter()
            .find(|&dir| tile.neighbor(dir) == Some(to))
            .ok_or_else(|| {
                debug!(?from, ?to, "Tiles are not adjacent");
                GridError::NotAdjacent { from, to }
            })
    }

    /// Linked neighbors of `tile` in slot order.
    #[must_use]
    pub fn neighbors(&self, tile: TileId, include_teleport: bool) -> Vec<TileId> {
        self.edges(tile, include_teleport)
            .map(|(_, neighbor)| neighbor)
            .collect()
    }

    /// Slots of `tile` that hold a neighbor.
    #[must_use]
    pub fn directions(&self, tile: TileId, include_teleport: bool) -> Vec<Direction> {
        self.edges(tile, include_teleport)
            .map(|(direction, _)| direction)
            .collect()
    }

    /// Linked `(slot, neighbor)` pairs of `tile` in slot order.
    pub fn edges(
        &self,
        tile: TileId,
        include_teleport: bool,
    ) -> impl Iterator<Item = (Direction, TileId)> + '_ {
        let tile = self.tiles.get(tile);
        Direction::ALL
            .into_iter()
            .filter(move |dir| include_teleport || dir.is_spatial())
            .filter_map(move |dir| tile.and_then(|t| t.neighbor(dir)).map(|n| (dir, n)))
    }

    /// Verify that every spatial edge has its reciprocal and that every
    /// edge points at a live tile.
    pub fn check_reciprocity(&self) -> Result<()> {
        for (id, tile) in &self.tiles {
            for direction in Direction::ALL {
                let Some(other) = tile.neighbor(direction) else {
                    continue;
                };
                let Some(other_tile) = self.tiles.get(other) else {
                    return Err(GridError::UnknownTile(other));
                };
                if direction.is_spatial() && other_tile.neighbor(direction.opposite()) != Some(id)
                {
                    return Err(GridError::NotAdjacent {
                        from: other,
                        to: id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Cost of entering `tile`.
    #[must_use]
    pub fn movement_cost(&self, tile: TileId) -> Option<u32> {
        self.tiles.get(tile).map(Tile::movement_cost)
    }

    /// Change a tile's category.
    pub fn set_kind(&mut self, tile: TileId, kind: TileKind) -> Result<()> {
        self.tile_mut(tile)?.set_kind(kind);
        Ok(())
    }

    /// Change a tile's movement cost. Zero is raised to 1.
    pub fn set_movement_cost(&mut self, tile: TileId, cost: u32) -> Result<()> {
        self.tile_mut(tile)?.set_cost(cost);
        Ok(())
    }

    /// Occupant bound to `tile`.
    #[must_use]
    pub fn occupant(&self, tile: TileId) -> Option<OccupantId> {
        self.tiles.get(tile).and_then(Tile::occupant)
    }

    pub(crate) fn set_occupant(&mut self, tile: TileId, occupant: Option<OccupantId>) -> Result<()> {
        self.tile_mut(tile)?.set_occupant(occupant);
        Ok(())
    }

    /// Hex distance between two tiles.
    #[must_use]
    pub fn hex_distance(&self, a: TileId, b: TileId) -> Option<u32> {
        let a = self.tiles.get(a)?;
        let b = self.tiles.get(b)?;
        Some(a.axial().distance(b.axial()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(graph: &mut TileGraph, n: i32) -> Vec<TileId> {
        (0..n)
            .map(|c| graph.add_tile(GridCoord::new(0, c), TileKind::Standard).unwrap())
            .collect()
    }

    #[test]
    fn test_set_neighbor_writes_reciprocal() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 2);
        graph.set_neighbor(t[0], Direction::East, Some(t[1])).unwrap();

        assert_eq!(graph.neighbor(t[0], Direction::East), Some(t[1]));
        assert_eq!(graph.neighbor(t[1], Direction::West), Some(t[0]));
        graph.check_reciprocity().unwrap();
    }

    #[test]
    fn test_overwrite_unlinks_previous_neighbors() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 4);
        graph.set_neighbor(t[0], Direction::East, Some(t[1])).unwrap();
        graph.set_neighbor(t[2], Direction::East, Some(t[3])).unwrap();

        // t0 -> t3 displaces both t0's old neighbor and t3's old neighbor.
        graph.set_neighbor(t[0], Direction::East, Some(t[3])).unwrap();

        assert_eq!(graph.neighbor(t[1], Direction::West), None);
        assert_eq!(graph.neighbor(t[2], Direction::East), None);
        assert_eq!(graph.neighbor(t[3], Direction::West), Some(t[0]));
        graph.check_reciprocity().unwrap();
    }

    #[test]
    fn test_clear_removes_reciprocal() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 2);
        graph.set_neighbor(t[0], Direction::NorthEast, Some(t[1])).unwrap();
        graph.set_neighbor(t[1], Direction::SouthWest, None).unwrap();

        assert_eq!(graph.neighbor(t[0], Direction::NorthEast), None);
        graph.check_reciprocity().unwrap();
    }

    #[test]
    fn test_self_link_rejected() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 1);
        let err = graph.set_neighbor(t[0], Direction::East, Some(t[0]));
        assert_eq!(
            err,
            Err(GridError::SelfLink {
                tile: t[0],
                direction: Direction::East
            })
        );
        assert_eq!(graph.neighbor(t[0], Direction::East), None);
    }

    #[test]
    fn test_teleport_edges_are_one_way() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 2);
        graph.set_neighbor(t[0], Direction::Teleport, Some(t[1])).unwrap();

        assert_eq!(graph.neighbor(t[0], Direction::Teleport), Some(t[1]));
        assert_eq!(graph.neighbor(t[1], Direction::Teleport), None);
        graph.check_reciprocity().unwrap();
    }

    #[test]
    fn test_remove_tile_detaches_all_edges() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 3);
        graph.set_neighbor(t[0], Direction::East, Some(t[1])).unwrap();
        graph.set_neighbor(t[1], Direction::East, Some(t[2])).unwrap();
        graph.set_neighbor(t[2], Direction::Teleport, Some(t[1])).unwrap();

        graph.remove_tile(t[1]).unwrap();

        assert!(!graph.contains(t[1]));
        assert_eq!(graph.neighbor(t[0], Direction::East), None);
        assert_eq!(graph.neighbor(t[2], Direction::West), None);
        assert_eq!(graph.neighbor(t[2], Direction::Teleport), None);
        assert_eq!(graph.tile_at(GridCoord::new(0, 1)), None);
        graph.check_reciprocity().unwrap();
    }

    #[test]
    fn test_direction_between() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 3);
        graph.set_neighbor(t[0], Direction::East, Some(t[1])).unwrap();

        assert_eq!(graph.direction_between(t[0], t[1]), Ok(Direction::East));
        assert_eq!(graph.direction_between(t[1], t[0]), Ok(Direction::West));
        assert_eq!(
            graph.direction_between(t[0], t[2]),
            Err(GridError::NotAdjacent {
                from: t[0],
                to: t[2]
            })
        );
    }

    #[test]
    fn test_duplicate_coordinate_rejected() {
        let mut graph = TileGraph::new();
        graph.add_tile(GridCoord::new(1, 1), TileKind::Standard).unwrap();
        assert!(graph
            .add_tile(GridCoord::new(1, 1), TileKind::Wall)
            .is_err());
        assert_eq!(graph.tile_count(), 1);
    }

    #[test]
    fn test_neighbors_respect_teleport_flag() {
        let mut graph = TileGraph::new();
        let t = row_of(&mut graph, 3);
        graph.set_neighbor(t[0], Direction::East, Some(t[1])).unwrap();
        graph.set_neighbor(t[0], Direction::Teleport, Some(t[2])).unwrap();

        assert_eq!(graph.neighbors(t[0], false), vec![t[1]]);
        assert_eq!(graph.neighbors(t[0], true), vec![t[1], t[2]]);
        assert_eq!(
            graph.directions(t[0], true),
            vec![Direction::East, Direction::Teleport]
        );
    }
}
