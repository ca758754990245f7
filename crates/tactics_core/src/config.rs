//! Tunable simulation parameters.
//!
//! Loaded from RON. Speeds are fixed-point values stored as raw bits so a
//! config file reproduces the exact same simulation everywhere.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::math::{fixed_serde, Fixed};

/// Damage dealt to both parties when a displaced occupant hits an obstacle.
pub const IMPACT_DAMAGE: u32 = 4;

/// Knockback parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    /// Tiles travelled per tick while an obstacle lies ahead.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Speed multiplier when the path ends without an obstacle.
    pub free_flight_multiplier: u32,
    /// Damage applied to mover and obstacle on impact.
    pub impact_damage: u32,
    /// Whether a surviving obstacle is pushed onward with the remaining distance.
    pub chain_reactions: bool,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            speed: Fixed::from_bits(1 << 30),
            free_flight_multiplier: 2,
            impact_damage: IMPACT_DAMAGE,
            chain_reactions: true,
        }
    }
}

impl DisplacementConfig {
    /// Effective speed for a run.
    #[must_use]
    pub fn speed_for(&self, has_obstacle: bool) -> Fixed {
        if has_obstacle {
            self.speed
        } else {
            self.speed * Fixed::from_num(self.free_flight_multiplier.max(1))
        }
    }
}

/// Route movement parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Tiles travelled per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Ticks spent inside a teleporter before reappearing.
    pub teleport_delay: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            speed: Fixed::from_bits(1 << 31),
            teleport_delay: 2,
        }
    }
}

/// Full simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Knockback parameters.
    pub displacement: DisplacementConfig,
    /// Route movement parameters.
    pub movement: MovementConfig,
}

impl GridConfig {
    /// Parse a RON document. Missing fields take their defaults.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| GridError::ConfigParse(e.to_string()))?;
        if config.displacement.speed <= Fixed::ZERO || config.movement.speed <= Fixed::ZERO {
            return Err(GridError::ConfigParse("speeds must be positive".into()));
        }
        Ok(config)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GridError::ConfigParse(e.to_string()))
    }
}
