//! Proptest strategies for grid testing.
//!
//! These strategies generate random but reproducible boards, coordinates
//! and push requests for property-based tests.

use proptest::prelude::*;
use tactics_core::board::BoardShape;
use tactics_core::direction::Direction;
use tactics_core::math::{Fixed, Vec2Fixed};
use tactics_core::tile::{AxialCoord, GridCoord};

/// Any direction, Teleport included.
pub fn arb_direction() -> impl Strategy<Value = Direction> {
    prop::sample::select(Direction::ALL.to_vec())
}

/// One of the six spatial directions.
pub fn arb_spatial_direction() -> impl Strategy<Value = Direction> {
    prop::sample::select(Direction::CARDINAL.to_vec())
}

/// Offset coordinate in a modest window around the origin.
pub fn arb_grid_coord() -> impl Strategy<Value = GridCoord> {
    (-50i32..50, -50i32..50).prop_map(|(row, column)| GridCoord::new(row, column))
}

/// Axial coordinate in a modest window around the origin.
pub fn arb_axial_coord() -> impl Strategy<Value = AxialCoord> {
    (-50i32..50, -50i32..50).prop_map(|(q, r)| AxialCoord::new(q, r))
}

/// Small rectangle or hexagon board.
pub fn arb_board_shape() -> impl Strategy<Value = BoardShape> {
    prop_oneof![
        (1u32..10, 1u32..10).prop_map(|(width, height)| BoardShape::Rectangle { width, height }),
        (0u32..5).prop_map(|radius| BoardShape::Hexagon { radius }),
    ]
}

/// Fixed-point number in `-range..range` with quarter-unit steps.
pub fn arb_fixed(range: i32) -> impl Strategy<Value = Fixed> {
    (-range * 4..range * 4).prop_map(|quarters| Fixed::from_num(quarters) / 4)
}

/// Non-zero world-space offset.
pub fn arb_offset() -> impl Strategy<Value = Vec2Fixed> {
    (arb_fixed(20), arb_fixed(20))
        .prop_filter("non-zero offset", |(x, y)| *x != 0 || *y != 0)
        .prop_map(|(x, y)| Vec2Fixed::new(x, y))
}

/// Angle in whole degrees, `(-180, 180]`.
pub fn arb_angle() -> impl Strategy<Value = i32> {
    -179i32..=180
}

/// Health values (1-100).
pub fn arb_health() -> impl Strategy<Value = u32> {
    1u32..100u32
}

/// Push distance (0-6).
pub fn arb_push_distance() -> impl Strategy<Value = u32> {
    0u32..7u32
}

/// A unit placed at a `(row, column)` on a `width` x `height` rectangle.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Row.
    pub row: i32,
    /// Column.
    pub column: i32,
    /// Starting health.
    pub health: u32,
}

/// Up to `max` distinct unit placements inside a `width` x `height` board.
pub fn arb_placements(
    width: u32,
    height: u32,
    max: usize,
) -> impl Strategy<Value = Vec<Placement>> {
    let w = i32::try_from(width).unwrap_or(i32::MAX);
    let h = i32::try_from(height).unwrap_or(i32::MAX);
    proptest::collection::vec((0..h, 0..w, arb_health()), 0..max).prop_map(|raw| {
        let mut seen = std::collections::BTreeSet::new();
        raw.into_iter()
            .filter(|(row, column, _)| seen.insert((*row, *column)))
            .map(|(row, column, health)| Placement {
                row,
                column,
                health,
            })
            .collect()
    })
}
