//! Occupants: anything that can be bound to a tile.
//!
//! Capabilities are expressed through the [`Occupiable`], [`Displaceable`]
//! and [`Targetable`] traits and resolved by matching on [`OccupantKind`].

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::math::Vec2Fixed;
use crate::tile::{TileId, TileKind};

new_key_type! {
    /// Stable handle to an occupant.
    pub struct OccupantId;
}

/// What an occupant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupantKind {
    /// A combat unit.
    Unit,
    /// A placed wall segment.
    Wall,
    /// A placed hazard object (barrel, spikes).
    Hazard,
    /// An item lying on the floor. Never blocks.
    Pickup,
}

impl OccupantKind {
    /// Short glyph used by text renderers.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Unit => 'U',
            Self::Wall => 'W',
            Self::Hazard => 'H',
            Self::Pickup => 'p',
        }
    }
}

/// Which tile kinds an occupant may cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TraversalRule {
    /// Walks on the floor; cannot enter walls or removed tiles.
    #[default]
    Grounded,
    /// Floats over removed tiles; still stopped by walls.
    Hovering,
}

impl TraversalRule {
    /// Whether a tile of `kind` can be entered under this rule.
    #[must_use]
    pub const fn can_enter(self, kind: TileKind) -> bool {
        match kind {
            TileKind::Wall => false,
            TileKind::Removed => matches!(self, Self::Hovering),
            _ => true,
        }
    }
}

/// Current and maximum health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health.
    pub current: u32,
    /// Maximum health.
    pub max: u32,
}

impl Health {
    /// Full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Apply damage, returning the amount actually removed.
    pub fn damage(&mut self, amount: u32) -> u32 {
        let dealt = amount.min(self.current);
        self.current -= dealt;
        dealt
    }

    /// Restore health up to the maximum, returning the amount actually added.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let healed = amount.min(self.max - self.current.min(self.max));
        self.current += healed;
        healed
    }

    /// True once health has reached zero.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.current == 0
    }
}

/// Space occupancy capability.
pub trait Occupiable {
    /// Whether this occupant blocks others from sharing its tile.
    fn occupies_space(&self) -> bool;
}

/// Knockback capability.
pub trait Displaceable {
    /// Whether the occupant can be pushed at all.
    fn can_be_displaced(&self) -> bool;
    /// Whether the occupant may enter a tile of `kind`.
    fn can_traverse(&self, kind: TileKind) -> bool;
}

/// Targeting capability.
pub trait Targetable {
    /// Whether abilities may select this occupant.
    fn is_target(&self) -> bool;
}

/// Parameters for spawning an occupant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantSpec {
    /// Kind of occupant.
    pub kind: OccupantKind,
    /// Maximum health. `None` is indestructible.
    pub health: Option<u32>,
    /// Whether it can be pushed.
    pub displaceable: bool,
    /// Whether abilities may target it.
    pub targetable: bool,
    /// Traversal rule used while moving or being pushed.
    pub traversal: TraversalRule,
}

impl OccupantSpec {
    /// A pushable, targetable grounded unit.
    #[must_use]
    pub const fn unit(health: u32) -> Self {
        Self {
            kind: OccupantKind::Unit,
            health: Some(health),
            displaceable: true,
            targetable: true,
            traversal: TraversalRule::Grounded,
        }
    }

    /// An indestructible, immovable wall.
    #[must_use]
    pub const fn wall() -> Self {
        Self {
            kind: OccupantKind::Wall,
            health: None,
            displaceable: false,
            targetable: false,
            traversal: TraversalRule::Grounded,
        }
    }

    /// A breakable, pushable hazard object.
    #[must_use]
    pub const fn hazard(health: u32) -> Self {
        Self {
            kind: OccupantKind::Hazard,
            health: Some(health),
            displaceable: true,
            targetable: true,
            traversal: TraversalRule::Grounded,
        }
    }

    /// A pickup lying on the floor.
    #[must_use]
    pub const fn pickup() -> Self {
        Self {
            kind: OccupantKind::Pickup,
            health: None,
            displaceable: false,
            targetable: false,
            traversal: TraversalRule::Grounded,
        }
    }

    /// Same spec with a different traversal rule.
    #[must_use]
    pub const fn with_traversal(mut self, traversal: TraversalRule) -> Self {
        self.traversal = traversal;
        self
    }
}

/// An entity bound to a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    kind: OccupantKind,
    health: Option<Health>,
    displaceable: bool,
    targetable: bool,
    traversal: TraversalRule,
    tile: Option<TileId>,
    position: Vec2Fixed,
    alive: bool,
}

impl Occupant {
    /// Build an unplaced occupant from a spec.
    #[must_use]
    pub fn from_spec(spec: &OccupantSpec) -> Self {
        Self {
            kind: spec.kind,
            health: spec.health.map(Health::new),
            displaceable: spec.displaceable,
            targetable: spec.targetable,
            traversal: spec.traversal,
            tile: None,
            position: Vec2Fixed::ZERO,
            alive: true,
        }
    }

    /// Occupant kind.
    #[must_use]
    pub const fn kind(&self) -> OccupantKind {
        self.kind
    }

    /// Health, if destructible.
    #[must_use]
    pub const fn health(&self) -> Option<Health> {
        self.health
    }

    /// Traversal rule.
    #[must_use]
    pub const fn traversal(&self) -> TraversalRule {
        self.traversal
    }

    /// Cached tile back reference.
    #[must_use]
    pub const fn tile(&self) -> Option<TileId> {
        self.tile
    }

    /// Motion playback position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// False once health reached zero.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn set_tile(&mut self, tile: Option<TileId>) {
        self.tile = tile;
    }

    pub(crate) fn set_position(&mut self, position: Vec2Fixed) {
        self.position = position;
    }

    pub(crate) fn health_mut(&mut self) -> Option<&mut Health> {
        self.health.as_mut()
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }
}

impl Occupiable for Occupant {
    fn occupies_space(&self) -> bool {
        match self.kind {
            OccupantKind::Unit | OccupantKind::Wall | OccupantKind::Hazard => self.alive,
            OccupantKind::Pickup => false,
        }
    }
}

impl Displaceable for Occupant {
    fn can_be_displaced(&self) -> bool {
        match self.kind {
            OccupantKind::Unit | OccupantKind::Hazard => self.displaceable && self.alive,
            OccupantKind::Wall | OccupantKind::Pickup => false,
        }
    }

    fn can_traverse(&self, kind: TileKind) -> bool {
        self.traversal.can_enter(kind)
    }
}

impl Targetable for Occupant {
    fn is_target(&self) -> bool {
        match self.kind {
            OccupantKind::Unit | OccupantKind::Hazard => self.targetable && self.alive,
            OccupantKind::Wall => self.targetable,
            OccupantKind::Pickup => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickup_never_occupies_space() {
        let pickup = Occupant::from_spec(&OccupantSpec::pickup());
        assert!(!pickup.occupies_space());
        assert!(!pickup.can_be_displaced());
        assert!(!pickup.is_target());
    }

    #[test]
    fn test_wall_is_immovable() {
        let wall = Occupant::from_spec(&OccupantSpec::wall());
        assert!(wall.occupies_space());
        assert!(!wall.can_be_displaced());
        assert!(wall.health().is_none());
    }

    #[test]
    fn test_traversal_rules() {
        let grounded = Occupant::from_spec(&OccupantSpec::unit(10));
        let hovering =
            Occupant::from_spec(&OccupantSpec::unit(10).with_traversal(TraversalRule::Hovering));

        assert!(!grounded.can_traverse(TileKind::Removed));
        assert!(hovering.can_traverse(TileKind::Removed));
        assert!(!hovering.can_traverse(TileKind::Wall));
        assert!(grounded.can_traverse(TileKind::Hazard { entry_damage: 3 }));
    }

    #[test]
    fn test_health_damage_and_heal() {
        let mut health = Health::new(10);
        assert_eq!(health.damage(4), 4);
        assert_eq!(health.current, 6);
        assert_eq!(health.heal(10), 4);
        assert_eq!(health.current, 10);
        assert_eq!(health.damage(25), 10);
        assert!(health.is_depleted());
    }

    #[test]
    fn test_dead_unit_loses_capabilities() {
        let mut unit = Occupant::from_spec(&OccupantSpec::unit(5));
        unit.mark_dead();
        assert!(!unit.occupies_space());
        assert!(!unit.can_be_displaced());
        assert!(!unit.is_target());
    }
}
