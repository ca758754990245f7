//! Tiles and hex coordinates.
//!
//! A [`Tile`] is a node of the [`TileGraph`](crate::graph::TileGraph). Its
//! fields are read-only outside the crate; every edge and occupancy change
//! goes through the graph or the occupancy rules.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::direction::Direction;
use crate::math::{Fixed, Vec2Fixed, HALF, ROW_HEIGHT};
use crate::occupant::OccupantId;

new_key_type! {
    /// Stable handle to a tile. Removed tiles never alias live ones.
    pub struct TileId;
}

/// Row/column coordinate of a tile. Odd rows sit half a tile east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    /// Row index, growing north.
    pub row: i32,
    /// Column index, growing east.
    pub column: i32,
}

impl GridCoord {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }

    /// Convert to axial hex coordinates.
    #[must_use]
    pub const fn to_axial(self) -> AxialCoord {
        AxialCoord {
            q: self.column - self.row.div_euclid(2),
            r: self.row,
        }
    }
}

/// Axial hex coordinate used for layout and distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AxialCoord {
    /// Column-like axis.
    pub q: i32,
    /// Row axis.
    pub r: i32,
}

impl AxialCoord {
    /// Create an axial coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Convert back to a row/column coordinate.
    #[must_use]
    pub const fn to_grid(self) -> GridCoord {
        GridCoord {
            row: self.r,
            column: self.q + self.r.div_euclid(2),
        }
    }

    /// Coordinate of the neighbor in `direction`, if spatial.
    #[must_use]
    pub fn step(self, direction: Direction) -> Option<Self> {
        direction
            .axial_offset()
            .map(|(dq, dr)| Self::new(self.q + dq, self.r + dr))
    }

    /// Number of hex steps between two coordinates.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        let ds = dq + dr;
        dq.unsigned_abs()
            .max(dr.unsigned_abs())
            .max(ds.unsigned_abs())
    }

    /// Center of the hex at unit spacing, pointy-top layout.
    #[must_use]
    pub fn to_world(self) -> Vec2Fixed {
        let r = Fixed::from_num(self.r);
        Vec2Fixed::new(Fixed::from_num(self.q) + r * HALF, r * ROW_HEIGHT)
    }
}

/// Category of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileKind {
    /// Plain floor.
    #[default]
    Standard,
    /// Impassable for every occupant.
    Wall,
    /// Damages whoever enters.
    Hazard {
        /// Damage dealt on entry.
        entry_damage: u32,
    },
    /// Restores health to whoever enters.
    Heal {
        /// Health restored on entry.
        amount: u32,
    },
    /// End of a teleporter pair.
    Teleport,
    /// A hole in the board. Only hovering occupants may cross it.
    Removed,
}

impl TileKind {
    /// Damage dealt to an occupant entering this tile.
    #[must_use]
    pub const fn entry_damage(self) -> u32 {
        match self {
            Self::Hazard { entry_damage } => entry_damage,
            _ => 0,
        }
    }

    /// Short glyph used by text renderers.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Standard => '.',
            Self::Wall => '#',
            Self::Hazard { .. } => '^',
            Self::Heal { .. } => '+',
            Self::Teleport => '@',
            Self::Removed => ' ',
        }
    }
}

/// A node in the tile graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    coord: GridCoord,
    axial: AxialCoord,
    position: Vec2Fixed,
    cost: u32,
    kind: TileKind,
    occupant: Option<OccupantId>,
    neighbors: [Option<TileId>; Direction::COUNT],
}

impl Tile {
    pub(crate) fn new(coord: GridCoord, kind: TileKind) -> Self {
        let axial = coord.to_axial();
        Self {
            coord,
            axial,
            position: axial.to_world(),
            cost: 1,
            kind,
            occupant: None,
            neighbors: [None; Direction::COUNT],
        }
    }

    /// Row/column coordinate.
    #[must_use]
    pub const fn coord(&self) -> GridCoord {
        self.coord
    }

    /// Axial coordinate.
    #[must_use]
    pub const fn axial(&self) -> AxialCoord {
        self.axial
    }

    /// World-space center.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// Cost of entering this tile. Always at least 1.
    #[must_use]
    pub const fn movement_cost(&self) -> u32 {
        self.cost
    }

    /// Tile category.
    #[must_use]
    pub const fn kind(&self) -> TileKind {
        self.kind
    }

    /// Occupant currently bound to the tile.
    #[must_use]
    pub const fn occupant(&self) -> Option<OccupantId> {
        self.occupant
    }

    /// Neighbor in the given slot.
    #[must_use]
    pub const fn neighbor(&self, direction: Direction) -> Option<TileId> {
        self.neighbors[direction.index()]
    }

    pub(crate) fn set_neighbor_slot(&mut self, direction: Direction, neighbor: Option<TileId>) {
        self.neighbors[direction.index()] = neighbor;
    }

    pub(crate) fn set_occupant(&mut self, occupant: Option<OccupantId>) {
        self.occupant = occupant;
    }

    pub(crate) fn set_kind(&mut self, kind: TileKind) {
        self.kind = kind;
    }

    pub(crate) fn set_cost(&mut self, cost: u32) {
        self.cost = cost.max(1);
    }
}
