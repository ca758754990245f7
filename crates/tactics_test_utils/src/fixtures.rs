//! Test fixtures and helpers.
//!
//! Pre-built boards and occupant layouts for consistent testing.

use std::sync::{Arc, Mutex};

use fixed::types::I32F32;
use tactics_core::board::BoardShape;
use tactics_core::config::GridConfig;
use tactics_core::events::GridEvent;
use tactics_core::feedback::{AffordanceAnchor, AnimationCue, FeedbackPort};
use tactics_core::graph::TileGraph;
use tactics_core::occupant::{OccupantId, OccupantSpec};
use tactics_core::simulation::Simulation;
use tactics_core::tile::{GridCoord, TileId};
use tracing::debug;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Rectangular board simulation with default config.
///
/// # Panics
///
/// Panics on a zero-sized board.
#[must_use]
pub fn rect_sim(width: u32, height: u32) -> Simulation {
    Simulation::from_shape(BoardShape::Rectangle { width, height }, GridConfig::default())
        .expect("valid rectangle")
}

/// Hexagonal board simulation with default config.
///
/// # Panics
///
/// Panics if the board cannot be built.
#[must_use]
pub fn hex_sim(radius: u32) -> Simulation {
    Simulation::from_shape(BoardShape::Hexagon { radius }, GridConfig::default())
        .expect("valid hexagon")
}

/// Rectangular board graph.
///
/// # Panics
///
/// Panics on a zero-sized board.
#[must_use]
pub fn rect_graph(width: u32, height: u32) -> TileGraph {
    TileGraph::build(BoardShape::Rectangle { width, height }).expect("valid rectangle")
}

/// Tile at `(row, column)`.
///
/// # Panics
///
/// Panics if there is no such tile.
#[must_use]
pub fn at(sim: &Simulation, row: i32, column: i32) -> TileId {
    sim.graph()
        .tile_at(GridCoord::new(row, column))
        .unwrap_or_else(|| panic!("no tile at ({row}, {column})"))
}

/// Spawn a unit with `health` at `(row, column)`.
///
/// # Panics
///
/// Panics if the tile is missing or taken.
pub fn spawn_unit(sim: &mut Simulation, row: i32, column: i32, health: u32) -> OccupantId {
    let tile = at(sim, row, column);
    sim.spawn(&OccupantSpec::unit(health), tile)
        .expect("tile free")
}

/// Spawn an indestructible wall at `(row, column)`.
///
/// # Panics
///
/// Panics if the tile is missing or taken.
pub fn spawn_wall(sim: &mut Simulation, row: i32, column: i32) -> OccupantId {
    let tile = at(sim, row, column);
    sim.spawn(&OccupantSpec::wall(), tile).expect("tile free")
}

/// An 8x3 board with three units in a row, a wall at the end of the lane
/// and a push already requested on the first unit.
///
/// # Panics
///
/// Panics if the fixture layout is invalid.
#[must_use]
pub fn knockback_line() -> Simulation {
    let mut sim = rect_sim(8, 3);
    spawn_unit(&mut sim, 1, 2, 20);
    spawn_unit(&mut sim, 1, 3, 20);
    spawn_unit(&mut sim, 1, 4, 6);
    spawn_wall(&mut sim, 1, 6);
    let walker = spawn_unit(&mut sim, 0, 0, 10);

    let (target, source) = (at(&sim, 1, 2), at(&sim, 1, 1));
    sim.request_displacement(target, source, 3, false)
        .expect("push accepted");
    let goal = at(&sim, 2, 5);
    let route = sim.move_to(walker, goal).expect("route exists");
    debug!(hops = route.len(), "Built knockback fixture");
    sim
}

/// Tick until idle and flatten every emitted event.
pub fn drain_events(sim: &mut Simulation, max_ticks: u64) -> Vec<GridEvent> {
    sim.run_until_idle(max_ticks)
        .into_iter()
        .flat_map(|t| t.events)
        .collect()
}

/// One recorded feedback call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCall {
    /// `refresh_affordance`
    Affordance(TileId, AffordanceAnchor),
    /// `play_animation`
    Animation(OccupantId, AnimationCue),
    /// `show_damage`
    Damage(OccupantId, u32),
}

/// Feedback port that records every call into a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeedback {
    calls: Arc<Mutex<Vec<FeedbackCall>>>,
}

impl RecordingFeedback {
    /// Snapshot of the calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the log mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<FeedbackCall> {
        self.calls.lock().expect("feedback log poisoned").clone()
    }

    fn push(&self, call: FeedbackCall) {
        self.calls.lock().expect("feedback log poisoned").push(call);
    }
}

impl FeedbackPort for RecordingFeedback {
    fn refresh_affordance(&mut self, tile: TileId, anchor: AffordanceAnchor) {
        self.push(FeedbackCall::Affordance(tile, anchor));
    }

    fn play_animation(&mut self, occupant: OccupantId, cue: AnimationCue) {
        self.push(FeedbackCall::Animation(occupant, cue));
    }

    fn show_damage(&mut self, occupant: OccupantId, amount: u32) {
        self.push(FeedbackCall::Damage(occupant, amount));
    }
}
