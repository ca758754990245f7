//! # Tactics Core
//!
//! Deterministic hex grid core for turn-based tactics.
//!
//! This crate contains **only** grid logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Presentation hooks go through [`feedback::FeedbackPort`]; everything the
//! core decides is reported as [`events::GridEvent`]s.
//!
//! ## Crate Structure
//!
//! - [`graph`] - Tile graph with reciprocal neighbor slots
//! - [`board`] - Board construction and resizing
//! - [`occupancy`] - Binding occupants to tiles
//! - [`pathfinding`] - Range queries and A* routes
//! - [`displacement`] - Knockback and chain reactions
//! - [`movement`] - Route following
//! - [`simulation`] - Core simulation loop
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod board;
pub mod config;
pub mod direction;
pub mod displacement;
pub mod error;
pub mod events;
pub mod feedback;
pub mod graph;
pub mod math;
pub mod movement;
pub mod occupancy;
pub mod occupant;
pub mod pathfinding;
pub mod route;
pub mod simulation;
pub mod tile;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::BoardShape;
    pub use crate::config::{DisplacementConfig, GridConfig, MovementConfig};
    pub use crate::direction::Direction;
    pub use crate::displacement::{BatchId, DisplacementPlan, RunId};
    pub use crate::error::{GridError, Result};
    pub use crate::events::{DisplacementOutcome, GridEvent, MovementOutcome, TickEvents};
    pub use crate::feedback::{FeedbackPort, NullFeedback};
    pub use crate::graph::TileGraph;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::occupant::{OccupantId, OccupantKind, OccupantSpec, TraversalRule};
    pub use crate::simulation::Simulation;
    pub use crate::tile::{AxialCoord, GridCoord, TileId, TileKind};
    pub use crate::world::World;
}
