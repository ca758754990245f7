//! Error types for the grid simulation.
//!
//! Nothing in this crate is fatal: every variant describes a rejected
//! request that left the grid untouched.

use thiserror::Error;

use crate::direction::Direction;
use crate::occupant::OccupantId;
use crate::tile::TileId;

/// Result type alias using [`GridError`].
pub type Result<T> = std::result::Result<T, GridError>;

/// Top-level error type for all grid simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// Tile handle does not refer to a live tile.
    #[error("Unknown tile: {0:?}")]
    UnknownTile(TileId),

    /// Occupant handle does not refer to a live occupant.
    #[error("Unknown occupant: {0:?}")]
    UnknownOccupant(OccupantId),

    /// Two tiles that were expected to be neighbors are not linked.
    #[error("Tile {from:?} has no edge to tile {to:?}")]
    NotAdjacent {
        /// Tile the lookup started from.
        from: TileId,
        /// Tile that was expected to be a neighbor.
        to: TileId,
    },

    /// A tile cannot be linked to itself.
    #[error("Tile {tile:?} cannot be its own neighbor in direction {direction:?}")]
    SelfLink {
        /// Offending tile.
        tile: TileId,
        /// Slot that was being written.
        direction: Direction,
    },

    /// The tile already holds an occupant that blocks the request.
    #[error("Tile {0:?} is already occupied")]
    TileOccupied(TileId),

    /// The tile holds no occupant.
    #[error("Tile {0:?} has no occupant")]
    EmptyTile(TileId),

    /// A route is empty or not contiguous.
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// The occupant cannot be pushed.
    #[error("Occupant {0:?} cannot be displaced")]
    NotDisplaceable(OccupantId),

    /// No spatial direction links the source tile to the pushed tile.
    #[error("No push direction from {source_tile:?} to {target:?}")]
    NoPushDirection {
        /// Tile the push originates from.
        source_tile: TileId,
        /// Tile holding the pushed occupant.
        target: TileId,
    },

    /// A route movement is already in flight for this occupant.
    #[error("Occupant {0:?} is already moving")]
    AlreadyMoving(OccupantId),

    /// The occupant is being displaced and cannot start another motion.
    #[error("Occupant {0:?} is busy with a displacement")]
    Busy(OccupantId),

    /// No route exists between two tiles.
    #[error("No route from {from:?} to {to:?}")]
    NoRoute {
        /// Start tile.
        from: TileId,
        /// Goal tile.
        to: TileId,
    },

    /// Coordinate lies outside the board.
    #[error("No tile at row {row}, column {column}")]
    NoTileAt {
        /// Row index.
        row: i32,
        /// Column index.
        column: i32,
    },

    /// A tile already exists at this coordinate.
    #[error("A tile already exists at row {row}, column {column}")]
    CoordinateTaken {
        /// Row index.
        row: i32,
        /// Column index.
        column: i32,
    },

    /// Failed to parse a configuration document.
    #[error("Failed to parse config: {0}")]
    ConfigParse(String),
}
