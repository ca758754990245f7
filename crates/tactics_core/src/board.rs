//! Board construction and resizing.
//!
//! Boards are laid out in odd-row offset coordinates (odd rows shifted half
//! a tile east). All edges are written through
//! [`TileGraph::set_neighbor`], so resizing keeps the graph reciprocal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::graph::TileGraph;
use crate::occupant::OccupantId;
use crate::tile::{AxialCoord, GridCoord, TileId, TileKind};

/// Outline of a freshly built board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardShape {
    /// `height` rows of `width` tiles.
    Rectangle {
        /// Tiles per row.
        width: u32,
        /// Number of rows.
        height: u32,
    },
    /// Regular hexagon of tiles within `radius` steps of the center.
    Hexagon {
        /// Steps from the center tile to the rim.
        radius: u32,
    },
}

impl BoardShape {
    /// Coordinates covered by this shape, row by row.
    #[must_use]
    pub fn coords(self) -> Vec<GridCoord> {
        match self {
            Self::Rectangle { width, height } => {
                let (width, height) = (clamp_i32(width), clamp_i32(height));
                (0..height)
                    .flat_map(|row| (0..width).map(move |column| GridCoord::new(row, column)))
                    .collect()
            }
            Self::Hexagon { radius } => {
                let radius = clamp_i32(radius);
                let mut coords = Vec::new();
                for r in -radius..=radius {
                    let q_min = (-radius).max(-radius - r);
                    let q_max = radius.min(radius - r);
                    for q in q_min..=q_max {
                        coords.push(AxialCoord::new(q, r).to_grid());
                    }
                }
                coords
            }
        }
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TileGraph {
    /// Build a fully linked board of standard tiles.
    pub fn build(shape: BoardShape) -> Result<Self> {
        let mut graph = Self::new();
        let coords = shape.coords();
        for &coord in &coords {
            graph.add_tile(coord, TileKind::Standard)?;
        }
        for coord in coords {
            if let Some(id) = graph.tile_at(coord) {
                graph.link_to_layout(id)?;
            }
        }
        debug!(?shape, tiles = graph.tile_count(), "Built board");
        Ok(graph)
    }

    /// Link `tile` to every existing tile that is adjacent in the hex layout.
    pub fn link_to_layout(&mut self, tile: TileId) -> Result<()> {
        let axial = self.try_tile(tile)?.axial();
        for direction in Direction::CARDINAL {
            let Some(next) = axial.step(direction).and_then(|a| self.tile_at_axial(a)) else {
                continue;
            };
            if self.neighbor(tile, direction) != Some(next) {
                self.set_neighbor(tile, direction, Some(next))?;
            }
        }
        Ok(())
    }

    fn row_bounds(&self) -> Option<(i32, i32)> {
        let first = self.iter().next()?.1.coord().row;
        let last = self.iter().last()?.1.coord().row;
        Some((first, last))
    }

    fn column_bounds(&self) -> Option<(i32, i32)> {
        self.iter().fold(None, |bounds, (_, tile)| {
            let column = tile.coord().column;
            Some(match bounds {
                None => (column, column),
                Some((lo, hi)) => (lo.min(column), hi.max(column)),
            })
        })
    }

    /// Append a row above the current top row spanning every column in use.
    pub fn add_row_north(&mut self) -> Result<Vec<TileId>> {
        let (Some((_, top)), Some((left, right))) = (self.row_bounds(), self.column_bounds())
        else {
            return Ok(Vec::new());
        };
        let coords: Vec<_> = (left..=right).map(|c| GridCoord::new(top + 1, c)).collect();
        self.insert_linked(coords)
    }

    /// Append a column east of the current rightmost column, one tile per row.
    pub fn add_column_east(&mut self) -> Result<Vec<TileId>> {
        let Some((_, right)) = self.column_bounds() else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<i32> = self.iter().map(|(_, t)| t.coord().row).collect();
        rows.dedup();
        let coords: Vec<_> = rows
            .into_iter()
            .map(|row| GridCoord::new(row, right + 1))
            .collect();
        self.insert_linked(coords)
    }

    fn insert_linked(&mut self, coords: Vec<GridCoord>) -> Result<Vec<TileId>> {
        let mut added = Vec::with_capacity(coords.len());
        for coord in coords {
            added.push(self.add_tile(coord, TileKind::Standard)?);
        }
        for &id in &added {
            self.link_to_layout(id)?;
        }
        debug!(count = added.len(), "Inserted tiles");
        Ok(added)
    }

    /// Remove every tile in `row`. Returns the evicted occupants.
    pub fn remove_row(&mut self, row: i32) -> Result<Vec<OccupantId>> {
        let doomed: Vec<_> = self
            .iter()
            .filter(|(_, t)| t.coord().row == row)
            .map(|(id, _)| id)
            .collect();
        self.remove_all(doomed)
    }

    /// Remove every tile in `column`. Returns the evicted occupants.
    pub fn remove_column(&mut self, column: i32) -> Result<Vec<OccupantId>> {
        let doomed: Vec<_> = self
            .iter()
            .filter(|(_, t)| t.coord().column == column)
            .map(|(id, _)| id)
            .collect();
        self.remove_all(doomed)
    }

    fn remove_all(&mut self, tiles: Vec<TileId>) -> Result<Vec<OccupantId>> {
        let mut evicted = Vec::new();
        for id in tiles {
            if let Some(occupant) = self.remove_tile(id)? {
                evicted.push(occupant);
            }
        }
        Ok(evicted)
    }

    /// Change the kind of the tile at `coord`.
    pub fn set_kind_at(&mut self, coord: GridCoord, kind: TileKind) -> Result<TileId> {
        let id = self.tile_at(coord).ok_or(GridError::NoTileAt {
            row: coord.row,
            column: coord.column,
        })?;
        self.set_kind(id, kind)?;
        Ok(id)
    }

    /// Turn two tiles into a teleporter pair linked both ways.
    pub fn link_teleporters(&mut self, a: TileId, b: TileId) -> Result<()> {
        self.set_neighbor(a, Direction::Teleport, Some(b))?;
        self.set_neighbor(b, Direction::Teleport, Some(a))?;
        self.set_kind(a, TileKind::Teleport)?;
        self.set_kind(b, TileKind::Teleport)?;
        Ok(())
    }
}
