//! Route following.
//!
//! Each moving occupant walks its route one tick at a time. Straight runs of
//! the route share one facing; a teleporter hop pauses for a few ticks and
//! then relocates the occupant to the paired tile.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use tracing::{debug, trace, warn};

use crate::config::MovementConfig;
use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::events::{GridEvent, MovementOutcome};
use crate::feedback::AnimationCue;
use crate::occupant::OccupantId;
use crate::route::{next_facing, validate_route};
use crate::tile::TileId;
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteMove {
    route: Vec<TileId>,
    /// Index of the last route tile reached, `None` before the first.
    index: Option<usize>,
    segment_end: usize,
    facing: Direction,
    teleport_wait: Option<u32>,
}

impl RouteMove {
    fn next_index(&self) -> usize {
        self.index.map_or(0, |i| i + 1)
    }
}

enum Step {
    Continue,
    Done(MovementOutcome),
}

/// Drives every in-flight route movement.
#[derive(Debug, Default)]
pub struct MovementEngine {
    config: MovementConfig,
    moves: BTreeMap<OccupantId, RouteMove>,
}

impl MovementEngine {
    /// Engine with the given tuning.
    #[must_use]
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            moves: BTreeMap::new(),
        }
    }

    /// Whether `occupant` is following a route.
    #[must_use]
    pub fn is_moving(&self, occupant: OccupantId) -> bool {
        self.moves.contains_key(&occupant)
    }

    /// Whether no movement is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.moves.is_empty()
    }

    /// Remaining route tiles of `occupant`.
    #[must_use]
    pub fn remaining_route(&self, occupant: OccupantId) -> Option<&[TileId]> {
        self.moves
            .get(&occupant)
            .map(|m| &m.route[m.next_index().min(m.route.len())..])
    }

    /// Start walking `route`, which excludes the occupant's current tile.
    ///
    /// `displacing` tells whether the occupant is currently being pushed.
    pub fn request_move(
        &mut self,
        world: &mut World,
        occupant: OccupantId,
        route: Vec<TileId>,
        displacing: bool,
    ) -> Result<()> {
        let Some(start) = world
            .occupant(occupant)
            .filter(|o| o.is_alive())
            .and_then(|_| world.tile_of(occupant))
        else {
            warn!(?occupant, "Rejected move: occupant not on the board");
            return Err(GridError::UnknownOccupant(occupant));
        };
        if self.moves.contains_key(&occupant) {
            warn!(?occupant, "Rejected move: already moving");
            return Err(GridError::AlreadyMoving(occupant));
        }
        if displacing {
            warn!(?occupant, "Rejected move: being displaced");
            return Err(GridError::Busy(occupant));
        }
        validate_route(world.graph(), start, &route)?;

        let (facing, segment_end) = next_facing(world.graph(), start, &route, None)?;
        world.emit(GridEvent::FacingChanged { occupant, facing });
        world.feedback().play_animation(occupant, AnimationCue::Move);
        debug!(?occupant, tiles = route.len(), "Movement started");

        self.moves.insert(
            occupant,
            RouteMove {
                route,
                index: None,
                segment_end,
                facing,
                teleport_wait: None,
            },
        );
        Ok(())
    }

    /// Stop `occupant`'s movement, reporting it as interrupted.
    pub fn interrupt(&mut self, world: &mut World, occupant: OccupantId) {
        if self.moves.remove(&occupant).is_some() {
            finish(world, occupant, MovementOutcome::Interrupted);
        }
    }

    /// Advance every movement by one tick, in occupant order.
    pub fn tick(&mut self, world: &mut World) {
        let order: Vec<OccupantId> = self.moves.keys().copied().collect();
        for occupant in order {
            let Some(mut mv) = self.moves.remove(&occupant) else {
                continue;
            };
            match self.step(world, occupant, &mut mv) {
                Step::Continue => {
                    self.moves.insert(occupant, mv);
                }
                Step::Done(outcome) => finish(world, occupant, outcome),
            }
        }
    }

    fn step(&self, world: &mut World, occupant: OccupantId, mv: &mut RouteMove) -> Step {
        let Some(occ) = world.occupant(occupant) else {
            return Step::Done(MovementOutcome::Interrupted);
        };
        if !occ.is_alive() {
            return Step::Done(MovementOutcome::Died);
        }
        let position = occ.position();
        let Some(current) = world.tile_of(occupant) else {
            return Step::Done(MovementOutcome::Interrupted);
        };
        let Some(&target) = mv.route.get(mv.next_index()) else {
            return Step::Done(MovementOutcome::Arrived);
        };

        if mv.facing == Direction::Teleport {
            let wait = mv.teleport_wait.get_or_insert(self.config.teleport_delay);
            if *wait > 0 {
                *wait -= 1;
                trace!(?occupant, remaining = *wait, "Inside teleporter");
                if *wait > 0 {
                    return Step::Continue;
                }
            }
            mv.teleport_wait = None;
            if world.can_enter(target, occupant) {
                world.emit(GridEvent::Teleported {
                    occupant,
                    from: current,
                    to: target,
                });
                world
                    .feedback()
                    .play_animation(occupant, AnimationCue::Teleport);
            }
            return self.enter(world, occupant, current, target, mv);
        }

        let Some(goal) = world.graph().tile(target).map(|t| t.position()) else {
            return Step::Done(MovementOutcome::Blocked);
        };
        let (next, reached) = position.step_toward(goal, self.config.speed);
        if let Ok(o) = world.occupant_mut(occupant) {
            o.set_position(next);
        }
        if !reached {
            return Step::Continue;
        }
        self.enter(world, occupant, current, target, mv)
    }

    fn enter(
        &self,
        world: &mut World,
        occupant: OccupantId,
        current: TileId,
        target: TileId,
        mv: &mut RouteMove,
    ) -> Step {
        if !world.can_enter(target, occupant) {
            debug!(?occupant, ?target, "Movement blocked");
            if let Some(home) = world.graph().tile(current).map(|t| t.position()) {
                if let Ok(o) = world.occupant_mut(occupant) {
                    o.set_position(home);
                }
            }
            return Step::Done(MovementOutcome::Blocked);
        }

        let moved = world
            .unoccupy(current)
            .and_then(|_| world.occupy(target, occupant));
        if let Err(err) = moved {
            warn!(?occupant, ?target, %err, "Movement arrival failed");
            return Step::Done(MovementOutcome::Interrupted);
        }
        if let Err(err) = world.apply_entry_effect(target, occupant) {
            warn!(?occupant, ?target, %err, "Entry effect failed");
        }
        if world.occupant(occupant).is_some_and(|o| !o.is_alive()) {
            return Step::Done(MovementOutcome::Died);
        }

        let index = mv.next_index();
        mv.index = Some(index);
        if index + 1 >= mv.route.len() {
            return Step::Done(MovementOutcome::Arrived);
        }
        if index >= mv.segment_end {
            match next_facing(world.graph(), target, &mv.route, Some(index)) {
                Ok((facing, segment_end)) => {
                    mv.facing = facing;
                    mv.segment_end = segment_end;
                    world.emit(GridEvent::FacingChanged { occupant, facing });
                }
                Err(_) => return Step::Done(MovementOutcome::Blocked),
            }
        }
        Step::Continue
    }

    /// Feed movement state into a determinism hash.
    pub fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.moves.len().hash(state);
        for (occupant, mv) in &self.moves {
            occupant.hash(state);
            mv.hash(state);
        }
    }
}

fn finish(world: &mut World, occupant: OccupantId, outcome: MovementOutcome) {
    world.emit(GridEvent::MovementFinished { occupant, outcome });
    debug!(?occupant, ?outcome, "Movement finished");
}
