//! Knockback resolution.
//!
//! A push is planned synchronously when requested, then played back one
//! waypoint step per tick:
//!
//! ```text
//! Resolving ──► Moving ──────────► Finished
//!          └──► InstantResolved ──┘
//! ```
//!
//! Several pushes can share a [`BatchId`]; the batch continuation runs once
//! every member has finished. An obstacle that survives an impact gets a run
//! of its own in the same direction, carrying whatever distance is left over
//! (possibly none), and joins the same batches.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace, warn};

use crate::config::DisplacementConfig;
use crate::direction::Direction;
use crate::error::{GridError, Result};
use crate::events::{DisplacementOutcome, GridEvent};
use crate::feedback::AnimationCue;
use crate::math::{Fixed, Vec2Fixed};
use crate::occupant::{Displaceable, OccupantId, Targetable};
use crate::tile::TileId;
use crate::world::World;

new_key_type! {
    /// Handle to a batch barrier.
    pub struct BatchId;
}

/// Handle to one knockback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

/// Callback fired when every member of a batch has finished.
pub type Continuation = Box<dyn FnOnce(&mut World, BatchId) + Send>;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunPhase {
    /// Path being planned.
    Resolving,
    /// Playing back waypoints.
    Moving,
    /// Nothing to play back; finishes on the next tick.
    InstantResolved,
    /// Done. Finished runs are removed from the engine.
    Finished,
}

/// Result of planning a push without executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplacementPlan {
    /// Pushed occupant.
    pub occupant: OccupantId,
    /// Tile the push starts from.
    pub origin: TileId,
    /// Push direction.
    pub direction: Direction,
    /// Tiles the occupant will enter, in order.
    pub path: Vec<TileId>,
    /// Occupant blocking the path, if any.
    pub obstacle: Option<OccupantId>,
    /// Tile of the blocking occupant.
    pub obstacle_tile: Option<TileId>,
    /// Whether the occupant will die at the end of the run.
    pub doomed: bool,
}

impl DisplacementPlan {
    /// Tile the occupant ends on.
    #[must_use]
    pub fn destination(&self) -> TileId {
        self.path.last().copied().unwrap_or(self.origin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WaypointKind {
    Enter(TileId),
    Impact,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Waypoint {
    kind: WaypointKind,
    target: Vec2Fixed,
}

/// State of one active knockback.
#[derive(Debug, Clone)]
pub struct DisplacementRun {
    id: RunId,
    occupant: OccupantId,
    origin: TileId,
    direction: Direction,
    requested: u32,
    path: Vec<TileId>,
    obstacle: Option<OccupantId>,
    obstacle_tile: Option<TileId>,
    impacted: Option<OccupantId>,
    doomed: bool,
    speed: Fixed,
    waypoints: VecDeque<Waypoint>,
    last_tile: TileId,
    steps: u32,
    batches: BTreeSet<BatchId>,
    phase: RunPhase,
}

impl DisplacementRun {
    /// Run handle.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Pushed occupant.
    #[must_use]
    pub const fn occupant(&self) -> OccupantId {
        self.occupant
    }

    /// Tile the push started from.
    #[must_use]
    pub const fn origin(&self) -> TileId {
        self.origin
    }

    /// Push direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Requested push distance.
    #[must_use]
    pub const fn requested_distance(&self) -> u32 {
        self.requested
    }

    /// Tiles not yet travelled.
    #[must_use]
    pub fn remaining_distance(&self) -> u32 {
        self.requested.saturating_sub(self.steps)
    }

    /// Planned tiles.
    #[must_use]
    pub fn path(&self) -> &[TileId] {
        &self.path
    }

    /// Current obstacle.
    #[must_use]
    pub const fn obstacle(&self) -> Option<OccupantId> {
        self.obstacle
    }

    /// Whether the occupant dies at the end of the run.
    #[must_use]
    pub const fn doomed(&self) -> bool {
        self.doomed
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Last tile the occupant validly entered.
    #[must_use]
    pub const fn last_tile(&self) -> TileId {
        self.last_tile
    }

    /// Batches this run belongs to.
    pub fn batches(&self) -> impl Iterator<Item = BatchId> + '_ {
        self.batches.iter().copied()
    }
}

struct Batch {
    pending: BTreeSet<OccupantId>,
    continuation: Option<Continuation>,
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("pending", &self.pending)
            .field("has_continuation", &self.continuation.is_some())
            .finish()
    }
}

/// Follow-up push queued by an impact.
struct ChainPush {
    occupant: OccupantId,
    tile: TileId,
    direction: Direction,
    distance: u32,
    batches: BTreeSet<BatchId>,
}

/// Owns every active run and batch.
#[derive(Debug, Default)]
pub struct DisplacementEngine {
    config: DisplacementConfig,
    runs: BTreeMap<OccupantId, DisplacementRun>,
    batches: SlotMap<BatchId, Batch>,
    next_run: u64,
}

impl DisplacementEngine {
    /// Engine with the given tuning.
    #[must_use]
    pub fn new(config: DisplacementConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active tuning.
    #[must_use]
    pub fn config(&self) -> &DisplacementConfig {
        &self.config
    }

    /// Whether `occupant` has an active run.
    #[must_use]
    pub fn is_displacing(&self, occupant: OccupantId) -> bool {
        self.runs.contains_key(&occupant)
    }

    /// Active run of `occupant`.
    #[must_use]
    pub fn run(&self, occupant: OccupantId) -> Option<&DisplacementRun> {
        self.runs.get(&occupant)
    }

    /// Active runs in occupant order.
    pub fn runs(&self) -> impl Iterator<Item = &DisplacementRun> + '_ {
        self.runs.values()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.runs.is_empty() && self.batches.is_empty()
    }

    /// Members still pending in `batch`, `None` once it completed.
    #[must_use]
    pub fn batch_pending(&self, batch: BatchId) -> Option<usize> {
        self.batches.get(batch).map(|b| b.pending.len())
    }

    /// Whether a run still references `occupant`, as mover or obstacle.
    #[must_use]
    pub fn references(&self, occupant: OccupantId) -> bool {
        self.runs
            .values()
            .any(|r| r.occupant == occupant || r.obstacle == Some(occupant))
    }

    fn push_direction(
        world: &World,
        occupant_tile: TileId,
        source_tile: TileId,
    ) -> Result<Direction> {
        match world.graph().direction_between(source_tile, occupant_tile) {
            Ok(direction) if direction.is_spatial() => Ok(direction),
            _ => {
                warn!(?source_tile, target = ?occupant_tile, "Rejected push: no direction");
                Err(GridError::NoPushDirection {
                    source_tile,
                    target: occupant_tile,
                })
            }
        }
    }

    /// Plan a push without mutating anything.
    pub fn preview(
        &self,
        world: &World,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
    ) -> Result<DisplacementPlan> {
        let occupant = Self::pushable_at(world, occupant_tile)?;
        let direction = Self::push_direction(world, occupant_tile, source_tile)?;
        Ok(plan(world, occupant, occupant_tile, direction, distance, false))
    }

    /// Occupant a push would collide with, if it is a valid target.
    ///
    /// Used for damage forecasts.
    #[must_use]
    pub fn predict_obstacle(
        &self,
        world: &World,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
    ) -> Option<OccupantId> {
        let plan = self
            .preview(world, occupant_tile, source_tile, distance)
            .ok()?;
        plan.obstacle
            .filter(|&o| world.occupant(o).is_some_and(Targetable::is_target))
    }

    fn pushable_at(world: &World, tile: TileId) -> Result<OccupantId> {
        world.graph().try_tile(tile)?;
        let Some(occupant) = world.occupant_at(tile) else {
            warn!(?tile, "Rejected push: empty tile");
            return Err(GridError::EmptyTile(tile));
        };
        if !world
            .occupant(occupant)
            .is_some_and(Displaceable::can_be_displaced)
        {
            warn!(?occupant, "Rejected push: not displaceable");
            return Err(GridError::NotDisplaceable(occupant));
        }
        Ok(occupant)
    }

    /// Push the occupant on `occupant_tile` away from `source_tile`.
    ///
    /// Any run the occupant already had is cancelled without a finish event
    /// and the new run takes over its batch memberships.
    pub fn request(
        &mut self,
        world: &mut World,
        occupant_tile: TileId,
        source_tile: TileId,
        distance: u32,
        lethal: bool,
    ) -> Result<RunId> {
        let occupant = Self::pushable_at(world, occupant_tile)?;
        let direction = Self::push_direction(world, occupant_tile, source_tile)?;
        Ok(self.start_run(
            world,
            occupant,
            occupant_tile,
            direction,
            distance,
            lethal,
            BTreeSet::new(),
        ))
    }

    /// Push several occupants away from `source_tile` behind one barrier.
    ///
    /// Targets that cannot be pushed are skipped. The continuation fires
    /// once every accepted run has finished, immediately if none was.
    pub fn request_batch(
        &mut self,
        world: &mut World,
        targets: &[TileId],
        source_tile: TileId,
        distance: u32,
        lethal: bool,
        continuation: Option<Continuation>,
    ) -> (BatchId, Vec<Result<RunId>>) {
        let batch = self.batches.insert(Batch {
            pending: BTreeSet::new(),
            continuation,
        });

        let mut results = Vec::with_capacity(targets.len());
        for &tile in targets {
            let result = self.request(world, tile, source_tile, distance, lethal);
            if result.is_ok() {
                if let Some(occupant) = world.occupant_at(tile) {
                    self.join_batch(batch, occupant);
                }
            }
            results.push(result);
        }

        debug!(?batch, members = ?self.batch_pending(batch), "Batch requested");
        self.complete_batch_if_done(world, batch);
        (batch, results)
    }

    fn join_batch(&mut self, batch: BatchId, occupant: OccupantId) {
        let (Some(b), Some(run)) = (self.batches.get_mut(batch), self.runs.get_mut(&occupant))
        else {
            return;
        };
        b.pending.insert(occupant);
        run.batches.insert(batch);
    }

    fn start_run(
        &mut self,
        world: &mut World,
        occupant: OccupantId,
        tile: TileId,
        direction: Direction,
        distance: u32,
        lethal: bool,
        mut batches: BTreeSet<BatchId>,
    ) -> RunId {
        if let Some(old) = self.runs.remove(&occupant) {
            debug!(?occupant, run = ?old.id, "Cancelled run for re-request");
            batches.extend(old.batches);
        }

        let plan = plan(world, occupant, tile, direction, distance, lethal);
        self.next_run += 1;
        let id = RunId(self.next_run);

        for &batch in &batches {
            if let Some(b) = self.batches.get_mut(batch) {
                b.pending.insert(occupant);
            }
        }

        let waypoints = waypoints(world, &plan);
        let phase = if waypoints.is_empty() {
            RunPhase::InstantResolved
        } else {
            RunPhase::Moving
        };

        world.emit(GridEvent::DisplacementStarted {
            run: id,
            occupant,
            direction,
            path: plan.path.clone(),
            obstacle: plan.obstacle,
        });
        world
            .feedback()
            .play_animation(occupant, AnimationCue::Knockback);
        debug!(
            ?occupant,
            run = ?id,
            ?direction,
            distance,
            steps = plan.path.len(),
            obstacle = ?plan.obstacle,
            doomed = plan.doomed,
            "Displacement started"
        );

        self.runs.insert(
            occupant,
            DisplacementRun {
                id,
                occupant,
                origin: tile,
                direction,
                requested: distance,
                path: plan.path,
                obstacle: plan.obstacle,
                obstacle_tile: plan.obstacle_tile,
                impacted: None,
                doomed: plan.doomed,
                speed: self.config.speed_for(plan.obstacle.is_some()),
                waypoints,
                last_tile: tile,
                steps: 0,
                batches,
                phase,
            },
        );
        id
    }

    /// End `occupant`'s run now with [`DisplacementOutcome::Removed`].
    ///
    /// Used when the occupant leaves the board by other means.
    pub fn abort(&mut self, world: &mut World, occupant: OccupantId) {
        if let Some(run) = self.runs.remove(&occupant) {
            self.finish(world, run, DisplacementOutcome::Removed);
        }
    }

    /// Advance every run by one step, in occupant order.
    pub fn tick(&mut self, world: &mut World) {
        let order: Vec<OccupantId> = self.runs.keys().copied().collect();
        for occupant in order {
            let Some(mut run) = self.runs.remove(&occupant) else {
                continue;
            };
            let chain = self.step_run(world, &mut run);
            if run.phase != RunPhase::Finished {
                self.runs.insert(occupant, run);
            }
            if let Some(chain) = chain {
                self.start_chain(world, chain);
            }
            self.cancel_dead(world);
        }
        self.cancel_dead(world);
    }

    /// Finish every run whose occupant died or left the roster.
    ///
    /// Runs end the moment their occupant dies, whatever killed it.
    pub fn cancel_dead(&mut self, world: &mut World) {
        let dead: Vec<OccupantId> = self
            .runs
            .keys()
            .copied()
            .filter(|&o| !world.occupant(o).is_some_and(|occ| occ.is_alive()))
            .collect();
        for occupant in dead {
            let Some(run) = self.runs.remove(&occupant) else {
                continue;
            };
            let outcome = if world.occupant(occupant).is_some() {
                DisplacementOutcome::Died
            } else {
                DisplacementOutcome::Removed
            };
            debug!(?occupant, run = ?run.id, "Run cancelled by death");
            self.finish(world, run, outcome);
        }
    }

    fn start_chain(&mut self, world: &mut World, chain: ChainPush) {
        debug!(
            occupant = ?chain.occupant,
            distance = chain.distance,
            "Chain reaction"
        );
        self.start_run(
            world,
            chain.occupant,
            chain.tile,
            chain.direction,
            chain.distance,
            false,
            chain.batches,
        );
    }

    /// One step of one run. The run is detached from the map while stepping.
    fn step_run(&mut self, world: &mut World, run: &mut DisplacementRun) -> Option<ChainPush> {
        let occupant = run.occupant;
        let Some((alive, current)) = world
            .occupant(occupant)
            .map(|o| (o.is_alive(), o.position()))
        else {
            self.finish_in_place(world, run, DisplacementOutcome::Removed);
            return None;
        };
        if !alive {
            self.finish_in_place(world, run, DisplacementOutcome::Died);
            return None;
        }
        if world.tile_of(occupant) != Some(run.last_tile) {
            self.finish_in_place(world, run, DisplacementOutcome::Removed);
            return None;
        }

        if run.phase == RunPhase::InstantResolved {
            let outcome = settled(run);
            self.finish_in_place(world, run, outcome);
            return None;
        }

        let Some(&waypoint) = run.waypoints.front() else {
            let outcome = settled(run);
            self.finish_in_place(world, run, outcome);
            return None;
        };

        let (position, reached) = current.step_toward(waypoint.target, run.speed);
        if let Ok(o) = world.occupant_mut(occupant) {
            o.set_position(position);
        }
        trace!(?occupant, ?waypoint, reached, "Displacement step");
        if !reached {
            return None;
        }
        run.waypoints.pop_front();

        let mut chain = None;
        match waypoint.kind {
            WaypointKind::Enter(tile) => {
                if !self.arrive(world, run, tile) {
                    return None;
                }
            }
            WaypointKind::Impact => match self.impact(world, run) {
                ImpactResult::MoverDied(push) => {
                    // The chained run joins the batches before the mover leaves them.
                    if let Some(push) = push {
                        self.start_chain(world, push);
                    }
                    self.finish_in_place(world, run, DisplacementOutcome::Died);
                    return None;
                }
                ImpactResult::Survived(push) => chain = push,
            },
            WaypointKind::Return => {}
        }

        if run.waypoints.is_empty() {
            if let Some(push) = chain {
                self.start_chain(world, push);
            }
            let outcome = settled(run);
            self.finish_in_place(world, run, outcome);
            return None;
        }
        chain
    }

    /// Enter a planned tile, revalidating it first. Returns false if the run
    /// finished.
    fn arrive(&mut self, world: &mut World, run: &mut DisplacementRun, tile: TileId) -> bool {
        let occupant = run.occupant;
        if !world.can_enter(tile, occupant) {
            run.waypoints.clear();
            if let Some(blocker) = world.occupant_at(tile).filter(|_| world.is_occupied(tile)) {
                debug!(?occupant, ?blocker, ?tile, "Planned tile taken; new obstacle");
                let from = world.graph().tile(run.last_tile).map(|t| t.position());
                let to = world.graph().tile(tile).map(|t| t.position());
                if let (Some(from), Some(to)) = (from, to) {
                    run.obstacle = Some(blocker);
                    run.obstacle_tile = Some(tile);
                    run.speed = self.config.speed_for(true);
                    run.waypoints.push_back(Waypoint {
                        kind: WaypointKind::Impact,
                        target: from.midpoint(to),
                    });
                    run.waypoints.push_back(Waypoint {
                        kind: WaypointKind::Return,
                        target: from,
                    });
                }
            }
            if run.waypoints.is_empty() {
                let outcome = settled(run);
                self.finish_in_place(world, run, outcome);
                return false;
            }
            return true;
        }

        let moved = world
            .unoccupy(run.last_tile)
            .and_then(|_| world.occupy(tile, occupant));
        if let Err(err) = moved {
            warn!(?occupant, ?tile, %err, "Displacement arrival failed");
            self.finish_in_place(world, run, DisplacementOutcome::Removed);
            return false;
        }
        run.last_tile = tile;
        run.steps += 1;

        if !run.doomed {
            if let Err(err) = world.apply_entry_effect(tile, occupant) {
                warn!(?occupant, ?tile, %err, "Entry effect failed");
            }
            if world.occupant(occupant).is_some_and(|o| !o.is_alive()) {
                self.finish_in_place(world, run, DisplacementOutcome::Died);
                return false;
            }
        }
        true
    }

    fn impact(&mut self, world: &mut World, run: &mut DisplacementRun) -> ImpactResult {
        let occupant = run.occupant;
        let Some(obstacle_tile) = run.obstacle_tile else {
            return ImpactResult::Survived(None);
        };
        let Some(obstacle) = world
            .occupant_at(obstacle_tile)
            .filter(|_| world.is_occupied(obstacle_tile))
        else {
            debug!(?occupant, "Obstacle gone before impact");
            return ImpactResult::Survived(None);
        };

        let damage = self.config.impact_damage;
        run.obstacle = Some(obstacle);
        run.impacted = Some(obstacle);
        if let Err(err) = world.apply_damage(obstacle, damage) {
            warn!(?obstacle, %err, "Impact damage on obstacle failed");
        }
        world.emit(GridEvent::ObstacleHit {
            mover: occupant,
            obstacle,
            damage,
        });
        world.feedback().play_animation(occupant, AnimationCue::Impact);
        if let Err(err) = world.apply_damage(occupant, damage) {
            warn!(?occupant, %err, "Impact damage on mover failed");
        }

        let chain = self.chain_push(world, run, obstacle, obstacle_tile);
        if world.occupant(occupant).is_some_and(|o| !o.is_alive()) {
            return ImpactResult::MoverDied(chain);
        }
        ImpactResult::Survived(chain)
    }

    /// Follow-up run for an obstacle that survived an impact.
    ///
    /// A displaceable survivor always gets a run, zero-length when no
    /// distance is left or chaining is off, unless it is already running.
    fn chain_push(
        &self,
        world: &World,
        run: &DisplacementRun,
        obstacle: OccupantId,
        obstacle_tile: TileId,
    ) -> Option<ChainPush> {
        let pushable = world
            .occupant(obstacle)
            .is_some_and(|o| o.is_alive() && o.can_be_displaced());
        if !pushable {
            return None;
        }
        let remaining = if self.config.chain_reactions {
            run.requested
                .saturating_sub(run.steps)
                .saturating_sub(1)
        } else {
            0
        };
        if remaining == 0 && self.runs.contains_key(&obstacle) {
            return None;
        }
        Some(ChainPush {
            occupant: obstacle,
            tile: obstacle_tile,
            direction: run.direction,
            distance: remaining,
            batches: run.batches.clone(),
        })
    }

    fn finish_in_place(
        &mut self,
        world: &mut World,
        run: &mut DisplacementRun,
        outcome: DisplacementOutcome,
    ) {
        run.phase = RunPhase::Finished;
        let finished = DisplacementRun {
            batches: std::mem::take(&mut run.batches),
            waypoints: VecDeque::new(),
            path: Vec::new(),
            ..run.clone()
        };
        self.finish(world, finished, outcome);
    }

    fn finish(&mut self, world: &mut World, run: DisplacementRun, outcome: DisplacementOutcome) {
        let occupant = run.occupant;
        let alive = world.occupant(occupant).is_some_and(|o| o.is_alive());
        let outcome = if run.doomed && alive {
            DisplacementOutcome::Died
        } else {
            outcome
        };

        world.emit(GridEvent::DisplacementFinished {
            run: run.id,
            occupant,
            outcome,
        });
        debug!(?occupant, run = ?run.id, ?outcome, "Displacement finished");

        for batch in run.batches {
            if let Some(b) = self.batches.get_mut(batch) {
                b.pending.remove(&occupant);
            }
            self.complete_batch_if_done(world, batch);
        }

        if run.doomed && alive {
            if let Err(err) = world.kill(occupant) {
                warn!(?occupant, %err, "Doomed occupant could not be killed");
            }
        }
    }

    fn complete_batch_if_done(&mut self, world: &mut World, batch: BatchId) {
        if !self.batches.get(batch).is_some_and(|b| b.pending.is_empty()) {
            return;
        }
        let Some(done) = self.batches.remove(batch) else {
            return;
        };
        if let Some(continuation) = done.continuation {
            continuation(world, batch);
        }
        world.emit(GridEvent::BatchCompleted { batch });
        debug!(?batch, "Batch completed");
    }

    /// Feed run state into a determinism hash.
    pub fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.next_run.hash(state);
        for (occupant, run) in &self.runs {
            occupant.hash(state);
            run.id.hash(state);
            run.phase.hash(state);
            run.last_tile.hash(state);
            run.steps.hash(state);
            run.doomed.hash(state);
            run.obstacle.hash(state);
            run.waypoints.hash(state);
            run.batches.hash(state);
        }
        for (batch, b) in &self.batches {
            batch.hash(state);
            b.pending.hash(state);
        }
    }
}

enum ImpactResult {
    Survived(Option<ChainPush>),
    MoverDied(Option<ChainPush>),
}

fn settled(run: &DisplacementRun) -> DisplacementOutcome {
    match run.impacted {
        Some(obstacle) => DisplacementOutcome::Impact {
            tile: run.last_tile,
            obstacle,
        },
        None => DisplacementOutcome::Settled {
            tile: run.last_tile,
            steps: run.steps,
        },
    }
}

/// Walk up to `distance` tiles from `tile` in `direction`.
fn plan(
    world: &World,
    occupant: OccupantId,
    tile: TileId,
    direction: Direction,
    distance: u32,
    lethal: bool,
) -> DisplacementPlan {
    let graph = world.graph();
    let mut path = Vec::new();
    let mut obstacle = None;
    let mut obstacle_tile = None;
    let mut cursor = tile;

    for _ in 0..distance {
        let Some(next) = graph.neighbor(cursor, direction) else {
            break;
        };
        if world.is_occupied(next) {
            obstacle = world.occupant_at(next);
            obstacle_tile = Some(next);
            break;
        }
        if !world.can_enter(next, occupant) {
            break;
        }
        path.push(next);
        cursor = next;
    }

    let doomed = lethal
        || world
            .occupant(occupant)
            .and_then(|o| o.health())
            .is_some_and(|health| {
                let projected = path.iter().fold(health.current, |hp, &t| {
                    hp.saturating_sub(world.entry_damage(t))
                });
                projected == 0
            });

    DisplacementPlan {
        occupant,
        origin: tile,
        direction,
        path,
        obstacle,
        obstacle_tile,
        doomed,
    }
}

fn waypoints(world: &World, plan: &DisplacementPlan) -> VecDeque<Waypoint> {
    let graph = world.graph();
    let position = |tile: TileId| graph.tile(tile).map(|t| t.position());
    let mut out: VecDeque<Waypoint> = plan
        .path
        .iter()
        .filter_map(|&tile| {
            position(tile).map(|target| Waypoint {
                kind: WaypointKind::Enter(tile),
                target,
            })
        })
        .collect();

    if let Some(obstacle_tile) = plan.obstacle_tile {
        if let (Some(from), Some(to)) = (position(plan.destination()), position(obstacle_tile)) {
            out.push_back(Waypoint {
                kind: WaypointKind::Impact,
                target: from.midpoint(to),
            });
            out.push_back(Waypoint {
                kind: WaypointKind::Return,
                target: from,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::board::BoardShape;
    use crate::graph::TileGraph;
    use crate::occupant::OccupantSpec;
    use crate::tile::{GridCoord, TileKind};

    fn line(width: u32) -> (World, Vec<TileId>) {
        let world = World::new(
            TileGraph::build(BoardShape::Rectangle { width, height: 1 }).unwrap(),
        );
        let tiles = (0..width as i32)
            .map(|c| world.graph().tile_at(GridCoord::new(0, c)).unwrap())
            .collect();
        (world, tiles)
    }

    fn run_until_idle(engine: &mut DisplacementEngine, world: &mut World) -> Vec<GridEvent> {
        let mut events = world.take_events();
        for _ in 0..200 {
            if engine.is_idle() {
                break;
            }
            engine.tick(world);
            events.extend(world.take_events());
        }
        assert!(engine.is_idle(), "engine did not settle");
        events
    }

    fn finished(events: &[GridEvent], occupant: OccupantId) -> Vec<DisplacementOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                GridEvent::DisplacementFinished {
                    occupant: o,
                    outcome,
                    ..
                } if *o == occupant => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    fn hp(world: &World, occupant: OccupantId) -> u32 {
        world.occupant(occupant).unwrap().health().unwrap().current
    }

    #[test]
    fn test_push_truncates_at_board_edge() {
        let (mut world, t) = line(3);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 3, false).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        assert_eq!(world.tile_of(unit), Some(t[2]));
        assert_eq!(
            finished(&events, unit),
            vec![DisplacementOutcome::Settled {
                tile: t[2],
                steps: 1
            }]
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, GridEvent::ObstacleHit { .. })));
    }

    #[test]
    fn test_pickup_then_unit_impact() {
        let (mut world, t) = line(5);
        let mover = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let pickup = world.spawn(&OccupantSpec::pickup(), t[2]).unwrap();
        let blocker = world.spawn(&OccupantSpec::unit(10), t[3]).unwrap();
        let mut engine = DisplacementEngine::default();

        let plan = engine.preview(&world, t[1], t[0], 2).unwrap();
        assert_eq!(plan.path, vec![t[2]]);
        assert_eq!(plan.obstacle, Some(blocker));

        engine.request(&mut world, t[1], t[0], 2, false).unwrap();

        // Track the furthest point reached by the mover.
        let mut events = world.take_events();
        let mut furthest = Fixed::ZERO;
        while !engine.is_idle() {
            engine.tick(&mut world);
            events.extend(world.take_events());
            furthest = furthest.max(world.occupant(mover).unwrap().position().x);
        }

        let p2 = world.graph().tile(t[2]).unwrap().position();
        let p3 = world.graph().tile(t[3]).unwrap().position();
        assert_eq!(furthest, p2.midpoint(p3).x);
        assert_eq!(world.tile_of(mover), Some(t[2]));
        assert!(world.occupant(pickup).is_none());
        assert_eq!(hp(&world, mover), 6);
        assert_eq!(hp(&world, blocker), 6);
        assert_eq!(
            finished(&events, mover),
            vec![DisplacementOutcome::Impact {
                tile: t[2],
                obstacle: blocker
            }]
        );
        // Distance 2, one step taken: the blocker gets a zero-length run.
        assert_eq!(
            finished(&events, blocker),
            vec![DisplacementOutcome::Settled {
                tile: t[3],
                steps: 0
            }]
        );
        assert_eq!(world.tile_of(blocker), Some(t[3]));
    }

    #[test]
    fn test_obstacle_chains_after_mover_dies() {
        let (mut world, t) = line(7);
        let mover = world.spawn(&OccupantSpec::unit(4), t[1]).unwrap();
        let blocker = world.spawn(&OccupantSpec::unit(20), t[3]).unwrap();
        let mut engine = DisplacementEngine::default();

        let (batch, results) = engine.request_batch(&mut world, &[t[1]], t[0], 4, false, None);
        assert!(results[0].is_ok());
        let events = run_until_idle(&mut engine, &mut world);

        assert_eq!(finished(&events, mover), vec![DisplacementOutcome::Died]);
        assert!(!world.occupant(mover).unwrap().is_alive());
        assert_eq!(hp(&world, blocker), 16);
        assert_eq!(world.tile_of(blocker), Some(t[5]));
        assert_eq!(
            finished(&events, blocker),
            vec![DisplacementOutcome::Settled {
                tile: t[5],
                steps: 2
            }]
        );

        // The barrier waits for the chained run too.
        let blocker_done = events
            .iter()
            .position(|e| {
                matches!(e, GridEvent::DisplacementFinished { occupant, .. } if *occupant == blocker)
            })
            .unwrap();
        let completed = events
            .iter()
            .position(|e| *e == GridEvent::BatchCompleted { batch })
            .unwrap();
        assert!(blocker_done < completed);
    }

    #[test]
    fn test_chain_reaction_pushes_obstacle() {
        let (mut world, t) = line(6);
        let mover = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let blocker = world.spawn(&OccupantSpec::unit(10), t[3]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 4, false).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        // One step taken, one spent on the impact: two left for the blocker.
        assert_eq!(world.tile_of(mover), Some(t[2]));
        assert_eq!(world.tile_of(blocker), Some(t[5]));
        assert_eq!(finished(&events, mover).len(), 1);
        assert_eq!(
            finished(&events, blocker),
            vec![DisplacementOutcome::Settled {
                tile: t[5],
                steps: 2
            }]
        );
    }

    #[test]
    fn test_chain_disabled_by_config() {
        let (mut world, t) = line(6);
        world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let blocker = world.spawn(&OccupantSpec::unit(10), t[3]).unwrap();
        let mut engine = DisplacementEngine::new(DisplacementConfig {
            chain_reactions: false,
            ..DisplacementConfig::default()
        });

        engine.request(&mut world, t[1], t[0], 4, false).unwrap();
        let events = run_until_idle(&mut engine, &mut world);
        assert_eq!(world.tile_of(blocker), Some(t[3]));
        assert_eq!(
            finished(&events, blocker),
            vec![DisplacementOutcome::Settled {
                tile: t[3],
                steps: 0
            }]
        );
    }

    #[test]
    fn test_wall_obstacle_is_not_chained() {
        let (mut world, t) = line(5);
        let mover = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let wall = world.spawn(&OccupantSpec::wall(), t[2]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 3, false).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        assert_eq!(world.tile_of(mover), Some(t[1]));
        assert_eq!(world.tile_of(wall), Some(t[2]));
        assert_eq!(hp(&world, mover), 6);
        assert_eq!(
            finished(&events, mover),
            vec![DisplacementOutcome::Impact {
                tile: t[1],
                obstacle: wall
            }]
        );
    }

    #[test]
    fn test_wall_tile_stops_without_obstacle() {
        let (mut world, t) = line(5);
        let mover = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        world.set_tile_kind(t[3], TileKind::Wall).unwrap();
        let mut engine = DisplacementEngine::default();

        let plan = engine.preview(&world, t[1], t[0], 3).unwrap();
        assert_eq!(plan.path, vec![t[2]]);
        assert_eq!(plan.obstacle, None);

        engine.request(&mut world, t[1], t[0], 3, false).unwrap();
        run_until_idle(&mut engine, &mut world);
        assert_eq!(world.tile_of(mover), Some(t[2]));
        assert_eq!(hp(&world, mover), 10);
    }

    #[test]
    fn test_rejections_leave_no_trace() {
        let (mut world, t) = line(4);
        world.spawn(&OccupantSpec::wall(), t[1]).unwrap();
        world.spawn(&OccupantSpec::unit(10), t[3]).unwrap();
        world.take_events();
        let mut engine = DisplacementEngine::default();

        assert_eq!(
            engine.request(&mut world, t[2], t[1], 1, false),
            Err(GridError::EmptyTile(t[2]))
        );
        assert!(matches!(
            engine.request(&mut world, t[1], t[0], 1, false),
            Err(GridError::NotDisplaceable(_))
        ));
        assert_eq!(
            engine.request(&mut world, t[3], t[0], 1, false),
            Err(GridError::NoPushDirection {
                source_tile: t[0],
                target: t[3]
            })
        );
        assert!(world.take_events().is_empty());
        assert!(engine.is_idle());
    }

    #[test]
    fn test_teleport_edge_is_not_a_push_direction() {
        let (mut world, t) = line(4);
        world.link_teleporters(t[0], t[3]).unwrap();
        world.spawn(&OccupantSpec::unit(10), t[3]).unwrap();
        let mut engine = DisplacementEngine::default();

        assert!(matches!(
            engine.request(&mut world, t[3], t[0], 1, false),
            Err(GridError::NoPushDirection { .. })
        ));
    }

    #[test]
    fn test_zero_length_run_finishes_next_tick() {
        let (mut world, t) = line(2);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 3, false).unwrap();
        assert_eq!(engine.run(unit).unwrap().phase(), RunPhase::InstantResolved);
        assert_eq!(finished(&world.take_events(), unit).len(), 0);

        engine.tick(&mut world);
        assert_eq!(
            finished(&world.take_events(), unit),
            vec![DisplacementOutcome::Settled {
                tile: t[1],
                steps: 0
            }]
        );
        assert!(engine.is_idle());
    }

    #[test]
    fn test_re_request_cancels_first_run() {
        let (mut world, t) = line(8);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        let first = engine.request(&mut world, t[1], t[0], 5, false).unwrap();
        for _ in 0..3 {
            engine.tick(&mut world);
        }
        let here = world.tile_of(unit).unwrap();
        let back = world.graph().neighbor(here, Direction::West).unwrap();
        let second = engine.request(&mut world, here, back, 1, false).unwrap();
        assert_ne!(first, second);

        let events = run_until_idle(&mut engine, &mut world);
        let runs: Vec<RunId> = events
            .iter()
            .filter_map(|e| match e {
                GridEvent::DisplacementFinished { run, .. } => Some(*run),
                _ => None,
            })
            .collect();
        assert_eq!(runs, vec![second]);
    }

    #[test]
    fn test_batch_waits_for_all_members() {
        let graph = TileGraph::build(BoardShape::Hexagon { radius: 3 }).unwrap();
        let mut world = World::new(graph);
        let center = world.graph().tile_at(GridCoord::new(0, 0)).unwrap();
        let ring: Vec<TileId> = [Direction::East, Direction::NorthWest, Direction::SouthWest]
            .iter()
            .map(|&d| world.graph().neighbor(center, d).unwrap())
            .collect();
        for &tile in &ring {
            world.spawn(&OccupantSpec::unit(10), tile).unwrap();
        }

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut engine = DisplacementEngine::default();
        let (batch, results) = engine.request_batch(
            &mut world,
            &ring,
            center,
            2,
            false,
            Some(Box::new(move |_: &mut World, _: BatchId| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(engine.batch_pending(batch), Some(3));

        let mut finished_before = 0;
        let mut events = world.take_events();
        while !engine.is_idle() {
            engine.tick(&mut world);
            let tick_events = world.take_events();
            for event in &tick_events {
                match event {
                    GridEvent::DisplacementFinished { .. } => finished_before += 1,
                    GridEvent::BatchCompleted { batch: b } => {
                        assert_eq!(*b, batch);
                        assert_eq!(finished_before, 3);
                    }
                    _ => {}
                }
            }
            events.extend(tick_events);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GridEvent::BatchCompleted { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_batch_members_finishing_on_different_ticks() {
        let graph = TileGraph::build(BoardShape::Hexagon { radius: 3 }).unwrap();
        let mut world = World::new(graph);
        let center = world.graph().tile_at(GridCoord::new(0, 0)).unwrap();
        let walk = |world: &World, direction: Direction, steps: usize| {
            (0..steps).fold(center, |tile, _| {
                world.graph().neighbor(tile, direction).unwrap()
            })
        };

        // South-west stops after one tile, north-west flies two, east
        // crawls one tile then hits a wall.
        let south_west = walk(&world, Direction::SouthWest, 1);
        let north_west = walk(&world, Direction::NorthWest, 1);
        let east = walk(&world, Direction::East, 1);
        let wall_tile = walk(&world, Direction::SouthWest, 3);
        let wall_spot = walk(&world, Direction::East, 3);
        world.set_tile_kind(wall_tile, TileKind::Wall).unwrap();
        world.spawn(&OccupantSpec::wall(), wall_spot).unwrap();
        let ring = [south_west, north_west, east];
        for &tile in &ring {
            world.spawn(&OccupantSpec::unit(10), tile).unwrap();
        }

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut engine = DisplacementEngine::default();
        let (batch, results) = engine.request_batch(
            &mut world,
            &ring,
            center,
            2,
            false,
            Some(Box::new(move |_: &mut World, _: BatchId| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert!(results.iter().all(Result::is_ok));
        world.take_events();

        let mut finish_ticks = Vec::new();
        let mut completed_at = None;
        let mut tick = 0;
        while !engine.is_idle() {
            tick += 1;
            engine.tick(&mut world);
            for event in world.take_events() {
                match event {
                    GridEvent::DisplacementFinished { .. } => finish_ticks.push(tick),
                    GridEvent::BatchCompleted { batch: b } if b == batch => {
                        assert!(completed_at.is_none());
                        completed_at = Some(tick);
                    }
                    _ => {}
                }
            }
            let expected = usize::from(finish_ticks.len() == ring.len());
            assert_eq!(fired.load(Ordering::SeqCst), expected, "tick {tick}");
        }

        let mut distinct = finish_ticks.clone();
        distinct.dedup();
        assert_eq!(distinct.len(), 3, "finish ticks {finish_ticks:?}");
        assert_eq!(completed_at, finish_ticks.last().copied());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_batch_completes_immediately() {
        let (mut world, t) = line(3);
        let mut engine = DisplacementEngine::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let (batch, results) = engine.request_batch(
            &mut world,
            &[t[1]],
            t[0],
            1,
            false,
            Some(Box::new(move |_: &mut World, _: BatchId| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert!(results[0].is_err());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.batch_pending(batch), None);
        assert!(world
            .take_events()
            .contains(&GridEvent::BatchCompleted { batch }));
    }

    #[test]
    fn test_lethal_push_dies_after_finished() {
        let (mut world, t) = line(4);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 1, true).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        let finished_at = events
            .iter()
            .position(|e| matches!(e, GridEvent::DisplacementFinished { .. }))
            .unwrap();
        let died_at = events
            .iter()
            .position(|e| matches!(e, GridEvent::OccupantDied { .. }))
            .unwrap();
        assert!(finished_at < died_at);
        assert_eq!(finished(&events, unit), vec![DisplacementOutcome::Died]);
        assert!(!world.occupant(unit).unwrap().is_alive());
    }

    #[test]
    fn test_hazard_doom_suppresses_entry_damage() {
        let (mut world, t) = line(4);
        world
            .set_tile_kind(t[2], TileKind::Hazard { entry_damage: 5 })
            .unwrap();
        let unit = world.spawn(&OccupantSpec::unit(5), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        let plan = engine.preview(&world, t[1], t[0], 1).unwrap();
        assert!(plan.doomed);

        engine.request(&mut world, t[1], t[0], 1, false).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        assert!(!events
            .iter()
            .any(|e| matches!(e, GridEvent::Damaged { .. })));
        assert_eq!(finished(&events, unit), vec![DisplacementOutcome::Died]);
        assert!(!world.occupant(unit).unwrap().is_alive());
    }

    #[test]
    fn test_hazard_entry_damage_when_not_doomed() {
        let (mut world, t) = line(4);
        world
            .set_tile_kind(t[2], TileKind::Hazard { entry_damage: 3 })
            .unwrap();
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 1, false).unwrap();
        run_until_idle(&mut engine, &mut world);
        assert_eq!(hp(&world, unit), 7);
    }

    #[test]
    fn test_death_mid_run_synthesizes_finished() {
        let (mut world, t) = line(6);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 4, false).unwrap();
        engine.tick(&mut world);
        world.apply_damage(unit, 50).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        assert_eq!(finished(&events, unit), vec![DisplacementOutcome::Died]);
    }

    #[test]
    fn test_external_death_cancels_run_at_once() {
        let (mut world, t) = line(6);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 4, false).unwrap();
        engine.tick(&mut world);
        world.take_events();

        world.apply_damage(unit, 50).unwrap();
        engine.cancel_dead(&mut world);
        assert_eq!(
            finished(&world.take_events(), unit),
            vec![DisplacementOutcome::Died]
        );
        assert!(engine.is_idle());
    }

    #[test]
    fn test_impact_death_finishes_victim_run_same_tick() {
        let (mut world, t) = line(8);
        // Spawned first so its run is stepped before the mover's.
        let victim = world.spawn(&OccupantSpec::unit(4), t[2]).unwrap();
        world.spawn(&OccupantSpec::wall(), t[4]).unwrap();
        let mover = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        // The victim crawls toward the wall and stays on t2 for a while.
        engine.request(&mut world, t[2], t[1], 3, false).unwrap();
        engine.request(&mut world, t[1], t[0], 2, false).unwrap();
        world.take_events();

        engine.tick(&mut world);
        assert!(finished(&world.take_events(), victim).is_empty());

        engine.tick(&mut world);
        let events = world.take_events();
        assert!(events.contains(&GridEvent::ObstacleHit {
            mover,
            obstacle: victim,
            damage: crate::config::IMPACT_DAMAGE,
        }));
        assert_eq!(finished(&events, victim), vec![DisplacementOutcome::Died]);
        assert!(engine.run(victim).is_none());
        assert!(engine.run(mover).is_some());
    }

    #[test]
    fn test_planned_tile_taken_becomes_obstacle() {
        let (mut world, t) = line(6);
        let unit = world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 4, false).unwrap();
        let late = world.spawn(&OccupantSpec::hazard(10), t[3]).unwrap();
        let events = run_until_idle(&mut engine, &mut world);

        assert!(events.contains(&GridEvent::ObstacleHit {
            mover: unit,
            obstacle: late,
            damage: crate::config::IMPACT_DAMAGE,
        }));
        assert_eq!(world.tile_of(unit), Some(t[2]));
        assert_eq!(finished(&events, unit).len(), 1);
    }

    #[test]
    fn test_predict_obstacle_only_reports_targets() {
        let (mut world, t) = line(5);
        world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let wall = world.spawn(&OccupantSpec::wall(), t[2]).unwrap();
        let engine = DisplacementEngine::default();

        assert_eq!(
            engine.preview(&world, t[1], t[0], 2).unwrap().obstacle,
            Some(wall)
        );
        assert_eq!(engine.predict_obstacle(&world, t[1], t[0], 2), None);

        world.despawn(wall).unwrap();
        let target = world.spawn(&OccupantSpec::hazard(3), t[2]).unwrap();
        assert_eq!(engine.predict_obstacle(&world, t[1], t[0], 2), Some(target));
    }

    #[test]
    fn test_free_flight_is_faster() {
        let (mut world, t) = line(3);
        world.spawn(&OccupantSpec::unit(10), t[1]).unwrap();
        let mut engine = DisplacementEngine::default();

        engine.request(&mut world, t[1], t[0], 1, false).unwrap();
        let mut ticks = 0;
        while !engine.is_idle() {
            engine.tick(&mut world);
            ticks += 1;
        }
        // One tile at the doubled speed of 0.5 tiles per tick.
        assert_eq!(ticks, 2);
    }
}
