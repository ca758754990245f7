//! Presentation hooks.
//!
//! The core never renders anything. It calls into a [`FeedbackPort`] so a
//! front end can refresh highlights and play cues; every method defaults to
//! a no-op.

use crate::occupant::OccupantId;
use crate::tile::TileId;

/// Where a tile's hover/selection affordance should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffordanceAnchor {
    /// On top of a wall standing on the tile.
    Raised,
    /// On the floor.
    Floor,
}

/// Animation cues emitted during motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationCue {
    /// Start of a knockback.
    Knockback,
    /// Collision with an obstacle.
    Impact,
    /// Route movement step.
    Move,
    /// Vanishing into a teleporter.
    Teleport,
    /// Death.
    Death,
}

/// Front-end callbacks.
pub trait FeedbackPort: Send {
    /// A wall entered or left `tile`.
    fn refresh_affordance(&mut self, _tile: TileId, _anchor: AffordanceAnchor) {}

    /// Play a cue on an occupant.
    fn play_animation(&mut self, _occupant: OccupantId, _cue: AnimationCue) {}

    /// Show a damage number over an occupant.
    fn show_damage(&mut self, _occupant: OccupantId, _amount: u32) {}
}

/// Feedback port that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFeedback;

impl FeedbackPort for NullFeedback {}
