//! Outward notifications.
//!
//! Every observable state change is recorded as a [`GridEvent`] in the
//! world's buffer and handed out by [`Simulation::tick`](crate::simulation::Simulation::tick).

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::displacement::{BatchId, RunId};
use crate::occupant::OccupantId;
use crate::tile::TileId;

/// How a displacement run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplacementOutcome {
    /// Came to rest without hitting anything.
    Settled {
        /// Final tile.
        tile: TileId,
        /// Tiles travelled.
        steps: u32,
    },
    /// Hit an obstacle and bounced back to `tile`.
    Impact {
        /// Final tile.
        tile: TileId,
        /// What was hit.
        obstacle: OccupantId,
    },
    /// The mover died during or at the end of the run.
    Died,
    /// The mover or its tile was removed from the board.
    Removed,
}

/// How a route movement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementOutcome {
    /// Reached the last tile of the route.
    Arrived,
    /// The next tile could not be entered.
    Blocked,
    /// Cut short by a displacement or removal.
    Interrupted,
    /// The mover died on the way.
    Died,
}

/// Something observable that happened on the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridEvent {
    /// An occupant was bound to a tile.
    TileEntered {
        /// Occupant.
        occupant: OccupantId,
        /// Tile entered.
        tile: TileId,
    },
    /// An occupant was unbound from a tile.
    TileExited {
        /// Occupant.
        occupant: OccupantId,
        /// Tile left.
        tile: TileId,
    },
    /// A pickup was evicted by an occupant entering its tile.
    PickupCollected {
        /// The pickup.
        pickup: OccupantId,
        /// Who walked onto it.
        collector: OccupantId,
        /// Where.
        tile: TileId,
    },
    /// A knockback run began moving.
    DisplacementStarted {
        /// Run handle.
        run: RunId,
        /// Mover.
        occupant: OccupantId,
        /// Push direction.
        direction: Direction,
        /// Planned tiles, obstacle tile excluded.
        path: Vec<TileId>,
        /// Obstacle at the end of the path, if any.
        obstacle: Option<OccupantId>,
    },
    /// A knockback run ended. Exactly one per run.
    DisplacementFinished {
        /// Run handle.
        run: RunId,
        /// Mover.
        occupant: OccupantId,
        /// Result.
        outcome: DisplacementOutcome,
    },
    /// A displaced occupant collided with an obstacle.
    ObstacleHit {
        /// Mover.
        mover: OccupantId,
        /// Obstacle.
        obstacle: OccupantId,
        /// Damage applied to each side.
        damage: u32,
    },
    /// Health was removed.
    Damaged {
        /// Target.
        occupant: OccupantId,
        /// Amount actually removed.
        amount: u32,
        /// Health left.
        remaining: u32,
    },
    /// Health was restored.
    Healed {
        /// Target.
        occupant: OccupantId,
        /// Amount actually restored.
        amount: u32,
    },
    /// Health reached zero.
    OccupantDied {
        /// The dead occupant.
        occupant: OccupantId,
    },
    /// Every member of a batch finished and its continuation ran.
    BatchCompleted {
        /// Batch handle.
        batch: BatchId,
    },
    /// A moving occupant turned to face a new straight segment.
    FacingChanged {
        /// Mover.
        occupant: OccupantId,
        /// New facing. `Teleport` for a teleporter hop.
        facing: Direction,
    },
    /// An occupant came out of a teleporter.
    Teleported {
        /// Mover.
        occupant: OccupantId,
        /// Entry teleporter.
        from: TileId,
        /// Exit teleporter.
        to: TileId,
    },
    /// A route movement ended. Exactly one per accepted request.
    MovementFinished {
        /// Mover.
        occupant: OccupantId,
        /// Result.
        outcome: MovementOutcome,
    },
}

/// Events produced by one [`Simulation::tick`](crate::simulation::Simulation::tick).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick number that produced these events.
    pub tick: u64,
    /// Events in emission order.
    pub events: Vec<GridEvent>,
}

impl TickEvents {
    /// Number of `DisplacementFinished` events for `occupant`.
    #[must_use]
    pub fn finished_count(&self, occupant: OccupantId) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(e, GridEvent::DisplacementFinished { occupant: o, .. } if *o == occupant)
            })
            .count()
    }

    /// Whether no events were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
