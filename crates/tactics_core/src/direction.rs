//! Neighbor slots of a hex tile.
//!
//! Six spatial directions for a pointy-top hex layout plus one
//! non-spatial [`Direction::Teleport`] slot. The discriminants are part of
//! the contract: opposite pairs sit three slots apart.

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec2Fixed};

/// A neighbor slot of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Up and to the right.
    NorthEast = 0,
    /// Up and to the left.
    NorthWest = 1,
    /// Same row, to the left.
    West = 2,
    /// Down and to the left.
    SouthWest = 3,
    /// Down and to the right.
    SouthEast = 4,
    /// Same row, to the right.
    East = 5,
    /// Non-spatial edge to a linked teleporter tile.
    Teleport = 6,
}

impl Direction {
    /// Number of neighbor slots, Teleport included.
    pub const COUNT: usize = 7;

    /// Every slot in enumeration order.
    pub const ALL: [Direction; Self::COUNT] = [
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::SouthEast,
        Direction::East,
        Direction::Teleport,
    ];

    /// The six spatial slots in enumeration order.
    pub const CARDINAL: [Direction; 6] = [
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::SouthEast,
        Direction::East,
    ];

    /// Slot index used by neighbor tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Direction::index`].
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// False only for [`Direction::Teleport`].
    #[must_use]
    pub const fn is_spatial(self) -> bool {
        !matches!(self, Self::Teleport)
    }

    /// The slot pointing back the other way.
    ///
    /// Spatial slots are paired three apart; Teleport maps to itself.
    #[must_use]
    pub const fn opposite(self) -> Self {
        let dir = self as usize;
        if dir < 3 {
            Self::ALL[dir + 3]
        } else if dir < 6 {
            Self::ALL[dir - 3]
        } else {
            self
        }
    }

    /// Axial offset `(dq, dr)` of the neighbor in this slot.
    ///
    /// `r` grows north, `q` grows east along a row.
    #[must_use]
    pub const fn axial_offset(self) -> Option<(i32, i32)> {
        match self {
            Self::NorthEast => Some((0, 1)),
            Self::NorthWest => Some((-1, 1)),
            Self::West => Some((-1, 0)),
            Self::SouthWest => Some((0, -1)),
            Self::SouthEast => Some((1, -1)),
            Self::East => Some((1, 0)),
            Self::Teleport => None,
        }
    }

    /// Bucket a signed angle in degrees into one of the six sectors.
    ///
    /// The angle is measured counter-clockwise from east. Each sector owns
    /// its upper bound, so +30 is East, +90 is NorthEast and -90 is
    /// SouthWest; both +150 and -150 belong to West.
    #[must_use]
    pub fn from_angle(degrees: Fixed) -> Self {
        let full = Fixed::from_num(360);
        let half = Fixed::from_num(180);
        let mut angle = degrees;
        while angle > half {
            angle -= full;
        }
        while angle <= -half {
            angle += full;
        }

        if angle >= Fixed::from_num(150) || angle <= Fixed::from_num(-150) {
            Self::West
        } else if angle <= Fixed::from_num(-90) {
            Self::SouthWest
        } else if angle <= Fixed::from_num(-30) {
            Self::SouthEast
        } else if angle <= Fixed::from_num(30) {
            Self::East
        } else if angle <= Fixed::from_num(90) {
            Self::NorthEast
        } else {
            Self::NorthWest
        }
    }

    /// Bucket a planar offset the same way [`Direction::from_angle`] does.
    ///
    /// Uses exact comparisons against the sector boundaries
    /// (`tan 30 = 1/sqrt 3`), so no trigonometry is involved. A zero offset
    /// has no direction.
    #[must_use]
    pub fn from_offset(offset: Vec2Fixed) -> Option<Self> {
        let x = offset.x.to_bits();
        let y = offset.y.to_bits();
        if x == 0 && y == 0 {
            return None;
        }

        let x_sq = u128::from(x.unsigned_abs()).pow(2);
        let y_sq_3 = u128::from(y.unsigned_abs()).pow(2) * 3;

        let direction = if y > 0 {
            if x > 0 && y_sq_3 <= x_sq {
                Self::East
            } else if x >= 0 {
                Self::NorthEast
            } else if y_sq_3 > x_sq {
                Self::NorthWest
            } else {
                Self::West
            }
        } else if y < 0 {
            if x < 0 && y_sq_3 <= x_sq {
                Self::West
            } else if x <= 0 {
                Self::SouthWest
            } else if y_sq_3 >= x_sq {
                Self::SouthEast
            } else {
                Self::East
            }
        } else if x > 0 {
            Self::East
        } else {
            Self::West
        };

        Some(direction)
    }
}
