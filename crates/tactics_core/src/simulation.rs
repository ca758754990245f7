//! Core simulation loop.
//!
//! [`Simulation`] owns the world and the motion engines and advances them
//! in a fixed order each tick:
//!
//! 1. Route movement
//! 2. Displacement runs
//! 3. Reaping of dead occupants no run refers to
//!
//! Requests made between ticks take effect immediately where they are
//! synchronous (planning, validation) and their events are returned by the
//! next [`Simulation::tick`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::{debug, trace, warn};

use crate::board::BoardShape;
use crate::config::GridConfig;
use crate::direction::Direction;
use crate::displacement::{BatchId, Continuation, DisplacementEngine, DisplacementPlan, RunId};
use crate::error::{GridError, Result};
use crate::events::TickEvents;
use crate::feedback::FeedbackPort;
use crate::graph::TileGraph;
use crate::movement::MovementEngine;
use crate::occupant::{OccupantId, OccupantSpec};
use crate::pathfinding::{self, Pathfinder};
use crate::tile::TileId;
use crate::world::World;

/// The grid simulation.
#[derive(Debug)]
pub struct Simulation {
    tick: u64,
    config: GridConfig,
    world: World,
    pathfinder: Pathfinder,
    movement: MovementEngine,
    displacement: DisplacementEngine,
}

impl Simulation {
    /// Simulation over an existing graph.
    #[must_use]
    pub fn new(graph: TileGraph, config: GridConfig) -> Self {
        Self::from_world(World::new(graph), config)
    }

    /// Simulation over an existing graph with a custom feedback port.
    #[must_use]
    pub fn with_feedback(
        graph: TileGraph,
        config: GridConfig,
        feedback: Box<dyn FeedbackPort>,
    ) -> Self {
        Self::from_world(World::with_feedback(graph, feedback), config)
    }

    /// Build a fresh board of `shape`.
    pub fn from_shape(shape: BoardShape, config: GridConfig) -> Result<Self> {
        Ok(Self::new(TileGraph::build(shape)?, config))
    }

    fn from_world(world: World, config: GridConfig) -> Self {
        Self {
            tick: 0,
            movement: MovementEngine::new(config.movement.clone()),
            displacement: DisplacementEngine::new(config.displacement.clone()),
            pathfinder: Pathfinder::new(),
            config,
            world,
        }
    }

    /// Number of ticks advanced so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Shared grid state.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable grid state, for authoring tiles and edges.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The tile graph.
    #[must_use]
    pub fn graph(&self) -> &TileGraph {
        self.world.graph()
    }

    /// The displacement engine, for inspecting runs and batches.
    #[must_use]
    pub fn displacement(&self) -> &DisplacementEngine {
        &self.displacement
    }

    /// The movement engine.
    #[must_use]
    pub fn movement(&self) -> &MovementEngine {
        &self.movement
    }

    /// Whether no motion or batch is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.movement.is_idle() && self.displacement.is_idle()
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickEvents {
        self.movement.tick(&mut self.world);
        self.displacement.tick(&mut self.world);

        // Chain reactions may have pushed occupants that were walking.
        let pushed: Vec<OccupantId> = self
            .world
            .occupants()
            .map(|(id, _)| id)
            .filter(|&id| self.movement.is_moving(id) && self.displacement.is_displacing(id))
            .collect();
        for occupant in pushed {
            self.movement.interrupt(&mut self.world, occupant);
        }

        self.reap();
        self.tick += 1;

        let events = self.world.take_events();
        trace!(tick = self.tick, events = events.len(), "Tick complete");
        TickEvents {
            tick: self.tick,
            events,
        }
    }

    /// Tick until idle or until `max_ticks` have passed.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> Vec<TickEvents> {
        let mut out = Vec::new();
        for _ in 0..max_ticks {
            if self.is_idle() && self.world.pending_events().is_empty() {
                break;
            }
            out.push(self.tick());
        }
        out
    }

    fn reap(&mut self) {
        let dead: Vec<OccupantId> = self
            .world
            .occupants()
            .filter(|(_, o)| !o.is_alive())
            .map(|(id, _)| id)
            .filter(|&id| !self.displacement.references(id) && !self.movement.is_moving(id))
            .collect();
        for occupant in dead {
            self.world.occupants.remove(occupant);
            debug!(?occupant, "Reaped dead occupant");
        }
    }

    /// Spawn an occupant on `tile`.
    pub fn spawn(&mut self, spec: &OccupantSpec, tile: TileId) -> Result<OccupantId> {
        self.world.spawn(spec, tile)
    }

    /// Remove an occupant, ending any motion it was part of.
    pub fn despawn(&mut self, occupant: OccupantId) -> Result<()> {
        self.world.try_occupant(occupant)?;
        self.movement.interrupt(&mut self.world, occupant);
        self.displacement.abort(&mut self.world, occupant);
        self.world.despawn(occupant)
    }

    /// Damage an occupant. Returns true if it died.
    pub fn apply_damage(&mut self, occupant: OccupantId, amount: u32) -> Result<bool> {
        let killed = self.world.apply_damage(occupant, amount)?;
        if killed {
            self.displacement.cancel_dead(&mut self.world);
        }
        Ok(killed)
    }

    /// Exchange the tiles of two idle occupants.
    pub fn swap_places(&mut self, a: OccupantId, b: OccupantId) -> Result<()> {
        for id in [a, b] {
            if self.movement.is_moving(id) || self.displacement.is_displacing(id) {
                warn!(occupant = ?id, "Rejected swap: occupant is in motion");
                return Err(GridError::Busy(id));
            }
        }
        self.world.swap_places(a, b)
    }

    /// Push the occupant on `occupant_tile` away from `source_tile`.
    ///
    /// A route movement in progress is interrupted.
    pub fn request_displacement(
        &mut self,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
        lethal: bool,
    ) -> Result<RunId> {
        let occupant = self.world.occupant_at(occupant_tile);
        let run = self.displacement.request(
            &mut self.world,
            occupant_tile,
            source_tile,
            distance,
            lethal,
        )?;
        if let Some(occupant) = occupant {
            self.movement.interrupt(&mut self.world, occupant);
        }
        Ok(run)
    }

    /// Push several occupants behind one barrier.
    pub fn request_batch(
        &mut self,
        targets: &[TileId],
        source_tile: TileId,
        distance: u32,
        lethal: bool,
        continuation: Option<Continuation>,
    ) -> (BatchId, Vec<Result<RunId>>) {
        let movers: Vec<_> = targets
            .iter()
            .map(|&t| self.world.occupant_at(t))
            .collect();
        let (batch, results) = self.displacement.request_batch(
            &mut self.world,
            targets,
            source_tile,
            distance,
            lethal,
            continuation,
        );
        for (occupant, result) in movers.into_iter().zip(&results) {
            if let (Some(occupant), Ok(_)) = (occupant, result) {
                self.movement.interrupt(&mut self.world, occupant);
            }
        }
        (batch, results)
    }

    /// Plan a push without executing it.
    pub fn preview_displacement(
        &self,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
    ) -> Result<DisplacementPlan> {
        self.displacement
            .preview(&self.world, occupant_tile, source_tile, distance)
    }

    /// Targetable occupant a push would collide with.
    #[must_use]
    pub fn predict_obstacle(
        &self,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
    ) -> Option<OccupantId> {
        self.displacement
            .predict_obstacle(&self.world, occupant_tile, source_tile, distance)
    }

    /// Walk `occupant` along `route`.
    pub fn request_move(&mut self, occupant: OccupantId, route: Vec<TileId>) -> Result<()> {
        let displacing = self.displacement.is_displacing(occupant);
        self.movement
            .request_move(&mut self.world, occupant, route, displacing)
    }

    /// Find a route to `goal` and start walking it.
    pub fn move_to(&mut self, occupant: OccupantId, goal: TileId) -> Result<Vec<TileId>> {
        let start = self
            .world
            .tile_of(occupant)
            .ok_or(GridError::UnknownOccupant(occupant))?;
        let route = self
            .pathfinder
            .find_route(&self.world, start, goal, occupant)?;
        if route.is_empty() {
            return Ok(route);
        }
        self.request_move(occupant, route.clone())?;
        Ok(route)
    }

    /// Tiles `mover` can reach within `budget`, with their costs.
    pub fn reachable_tiles(
        &mut self,
        start: TileId,
        budget: u32,
        mover: OccupantId,
    ) -> Vec<(TileId, u32)> {
        self.pathfinder
            .reachable_tiles(&self.world, start, budget, mover)
    }

    /// Cheapest route for `mover` from `start` to `goal`, start excluded.
    pub fn find_route(
        &mut self,
        start: TileId,
        goal: TileId,
        mover: OccupantId,
    ) -> Result<Vec<TileId>> {
        self.pathfinder.find_route(&self.world, start, goal, mover)
    }

    /// Tiles within `range` steps of `start`.
    #[must_use]
    pub fn tiles_in_range(&self, start: TileId, range: u32) -> Vec<TileId> {
        pathfinding::tiles_in_range(self.world.graph(), start, range)
    }

    /// Hex distance between two tiles.
    #[must_use]
    pub fn hex_distance(&self, a: TileId, b: TileId) -> Option<u32> {
        pathfinding::hex_distance(self.world.graph(), a, b)
    }

    /// Neighbor of `tile` in `direction`.
    #[must_use]
    pub fn neighbor(&self, tile: TileId, direction: Direction) -> Option<TileId> {
        self.world.graph().neighbor(tile, direction)
    }

    /// Which slot of `from` holds `to`.
    pub fn direction_between(&self, from: TileId, to: TileId) -> Result<Direction> {
        self.world.graph().direction_between(from, to)
    }

    /// Remove a row of tiles, ending the motion of anyone standing there.
    pub fn remove_row(&mut self, row: i32) -> Result<Vec<OccupantId>> {
        let evicted = self.world.remove_row(row)?;
        self.stop_all(&evicted);
        Ok(evicted)
    }

    /// Remove a column of tiles, ending the motion of anyone standing there.
    pub fn remove_column(&mut self, column: i32) -> Result<Vec<OccupantId>> {
        let evicted = self.world.remove_column(column)?;
        self.stop_all(&evicted);
        Ok(evicted)
    }

    fn stop_all(&mut self, occupants: &[OccupantId]) {
        for &occupant in occupants {
            self.movement.interrupt(&mut self.world, occupant);
            self.displacement.abort(&mut self.world, occupant);
        }
    }

    /// Hash of the full simulation state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);

        let graph = self.world.graph();
        graph.tile_count().hash(&mut hasher);
        for (id, tile) in graph.iter() {
            id.hash(&mut hasher);
            tile.coord().hash(&mut hasher);
            tile.kind().hash(&mut hasher);
            tile.movement_cost().hash(&mut hasher);
            tile.occupant().hash(&mut hasher);
            for direction in Direction::ALL {
                tile.neighbor(direction).hash(&mut hasher);
            }
        }

        self.world.occupant_count().hash(&mut hasher);
        for (id, occupant) in self.world.occupants() {
            id.hash(&mut hasher);
            occupant.kind().hash(&mut hasher);
            occupant.health().hash(&mut hasher);
            occupant.tile().hash(&mut hasher);
            occupant.position().hash(&mut hasher);
            occupant.is_alive().hash(&mut hasher);
        }

        self.movement.hash_state(&mut hasher);
        self.displacement.hash_state(&mut hasher);

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DisplacementOutcome, GridEvent, MovementOutcome};
    use crate::tile::GridCoord;

    fn sim() -> Simulation {
        Simulation::from_shape(
            BoardShape::Rectangle {
                width: 6,
                height: 2,
            },
            GridConfig::default(),
        )
        .unwrap()
    }

    fn at(sim: &Simulation, row: i32, column: i32) -> TileId {
        sim.graph().tile_at(GridCoord::new(row, column)).unwrap()
    }

    #[test]
    fn test_tick_advances_counter() {
        let mut sim = sim();
        assert_eq!(sim.current_tick(), 0);
        let events = sim.tick();
        assert_eq!(events.tick, 1);
        assert!(events.is_empty());
    }

    #[test]
    fn test_displacement_interrupts_movement() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        sim.request_move(unit, vec![at(&sim, 0, 2), at(&sim, 0, 3)])
            .unwrap();
        sim.tick();

        sim.request_displacement(at(&sim, 0, 1), at(&sim, 0, 2), 1, false)
            .unwrap();
        let events: Vec<GridEvent> = sim
            .run_until_idle(50)
            .into_iter()
            .flat_map(|t| t.events)
            .collect();

        assert!(events.contains(&GridEvent::MovementFinished {
            occupant: unit,
            outcome: MovementOutcome::Interrupted
        }));
        assert_eq!(sim.world().tile_of(unit), Some(at(&sim, 0, 0)));
    }

    #[test]
    fn test_move_rejected_while_displaced() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        sim.request_displacement(at(&sim, 0, 1), at(&sim, 0, 0), 2, false)
            .unwrap();
        assert_eq!(
            sim.request_move(unit, vec![at(&sim, 0, 0)]),
            Err(GridError::Busy(unit))
        );
    }

    #[test]
    fn test_dead_occupants_are_reaped_after_runs() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        sim.request_displacement(at(&sim, 0, 1), at(&sim, 0, 0), 2, true)
            .unwrap();

        sim.run_until_idle(50);
        sim.tick();
        assert!(sim.world().occupant(unit).is_none());
    }

    #[test]
    fn test_swap_rejects_busy() {
        let mut sim = sim();
        let a = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        let b = sim.spawn(&OccupantSpec::unit(10), at(&sim, 1, 4)).unwrap();
        sim.request_move(a, vec![at(&sim, 0, 2)]).unwrap();

        assert_eq!(sim.swap_places(a, b), Err(GridError::Busy(a)));
        sim.run_until_idle(20);
        sim.swap_places(a, b).unwrap();
        assert_eq!(sim.world().tile_of(a), Some(at(&sim, 1, 4)));
    }

    #[test]
    fn test_move_to_uses_pathfinder() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 0)).unwrap();
        let goal = at(&sim, 1, 4);
        let route = sim.move_to(unit, goal).unwrap();
        assert_eq!(route.last(), Some(&goal));

        sim.run_until_idle(100);
        assert_eq!(sim.world().tile_of(unit), Some(goal));
    }

    #[test]
    fn test_despawn_mid_push_finishes_run() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        sim.request_displacement(at(&sim, 0, 1), at(&sim, 0, 0), 3, false)
            .unwrap();
        sim.tick();
        sim.despawn(unit).unwrap();

        let events = sim.tick();
        assert_eq!(events.finished_count(unit), 1);
        assert!(sim.is_idle());
    }

    #[test]
    fn test_lethal_damage_stops_push_immediately() {
        let mut sim = sim();
        let unit = sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 1)).unwrap();
        sim.request_displacement(at(&sim, 0, 1), at(&sim, 0, 0), 3, false)
            .unwrap();
        sim.tick();

        assert_eq!(sim.apply_damage(unit, 10), Ok(true));
        assert!(!sim.displacement().is_displacing(unit));

        let events = sim.tick();
        assert_eq!(events.finished_count(unit), 1);
        assert!(events.events.contains(&GridEvent::DisplacementFinished {
            run: RunId(1),
            occupant: unit,
            outcome: DisplacementOutcome::Died,
        }));
        assert!(sim.is_idle());
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut sim = sim();
        let before = sim.state_hash();
        sim.spawn(&OccupantSpec::unit(10), at(&sim, 0, 0)).unwrap();
        assert_ne!(before, sim.state_hash());
    }
}
