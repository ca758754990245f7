//! Occupancy rules: binding occupants to tiles, entry effects and damage.
//!
//! Every bind and unbind goes through [`World::occupy`] and
//! [`World::unoccupy`], which keep the tile reference and the occupant's
//! back reference in sync and emit the matching events.

use tracing::{debug, trace, warn};

use crate::error::{GridError, Result};
use crate::events::GridEvent;
use crate::feedback::{AffordanceAnchor, AnimationCue};
use crate::occupant::{Displaceable, Occupiable, OccupantId, OccupantKind, Targetable};
use crate::tile::{TileId, TileKind};
use crate::world::World;

impl World {
    /// Occupant bound to `tile`, blocking or not.
    #[must_use]
    pub fn occupant_at(&self, tile: TileId) -> Option<OccupantId> {
        self.graph.occupant(tile)
    }

    /// Whether `tile` holds any occupant.
    #[must_use]
    pub fn has_occupant(&self, tile: TileId) -> bool {
        self.occupant_at(tile).is_some()
    }

    /// Whether `tile` holds an occupant that takes up space.
    #[must_use]
    pub fn is_occupied(&self, tile: TileId) -> bool {
        self.occupant_at(tile)
            .and_then(|id| self.occupants.get(id))
            .is_some_and(Occupiable::occupies_space)
    }

    /// Whether another occupant could be bound to `tile` right now.
    ///
    /// Ignores tile kind; traversal is checked separately by [`World::can_enter`].
    #[must_use]
    pub fn can_occupy(&self, tile: TileId) -> bool {
        self.graph.contains(tile) && !self.is_occupied(tile)
    }

    /// Whether `mover` may step onto `tile`.
    #[must_use]
    pub fn can_enter(&self, tile: TileId, mover: OccupantId) -> bool {
        let (Some(t), Some(m)) = (self.graph.tile(tile), self.occupants.get(mover)) else {
            return false;
        };
        m.can_traverse(t.kind()) && (!self.is_occupied(tile) || t.occupant() == Some(mover))
    }

    /// Whether `tile` holds a valid ability target.
    #[must_use]
    pub fn is_target(&self, tile: TileId) -> bool {
        self.occupant_at(tile)
            .and_then(|id| self.occupants.get(id))
            .is_some_and(Targetable::is_target)
    }

    /// Damage dealt by entering `tile`.
    #[must_use]
    pub fn entry_damage(&self, tile: TileId) -> u32 {
        self.graph.tile(tile).map_or(0, |t| t.kind().entry_damage())
    }

    /// Bind `occupant` to `tile`.
    ///
    /// Anything already on the tile is evicted first; an evicted pickup is
    /// collected and leaves the roster. The occupant is unbound from any
    /// other tile it was on.
    pub fn occupy(&mut self, tile: TileId, occupant: OccupantId) -> Result<()> {
        let Some(occ) = self.occupants.get(occupant) else {
            warn!(?tile, ?occupant, "Rejected occupy: unknown occupant");
            return Err(GridError::UnknownOccupant(occupant));
        };
        if !occ.is_alive() {
            warn!(?tile, ?occupant, "Rejected occupy: occupant is dead");
            return Err(GridError::UnknownOccupant(occupant));
        }
        let Some(position) = self.graph.tile(tile).map(|t| t.position()) else {
            warn!(?tile, ?occupant, "Rejected occupy: unknown tile");
            return Err(GridError::UnknownTile(tile));
        };

        let current = self.occupant_at(tile);
        if current == Some(occupant) {
            return Ok(());
        }
        if let Some(old_tile) = self.tile_of(occupant) {
            self.unoccupy(old_tile)?;
        }
        if let Some(previous) = current {
            self.unoccupy(tile)?;
            if self
                .occupants
                .get(previous)
                .is_some_and(|p| p.kind() == OccupantKind::Pickup)
            {
                self.occupants.remove(previous);
                self.emit(GridEvent::PickupCollected {
                    pickup: previous,
                    collector: occupant,
                    tile,
                });
                debug!(pickup = ?previous, collector = ?occupant, "Pickup collected");
            } else {
                debug!(evicted = ?previous, ?tile, "Evicted occupant");
            }
        }

        self.graph.set_occupant(tile, Some(occupant))?;
        let occ = self.occupant_mut(occupant)?;
        occ.set_tile(Some(tile));
        occ.set_position(position);
        let is_wall = occ.kind() == OccupantKind::Wall;

        self.emit(GridEvent::TileEntered { occupant, tile });
        if is_wall {
            self.feedback()
                .refresh_affordance(tile, AffordanceAnchor::Raised);
        }
        trace!(?occupant, ?tile, "Occupied");
        Ok(())
    }

    /// Unbind whatever occupant is on `tile` and return it.
    pub fn unoccupy(&mut self, tile: TileId) -> Result<OccupantId> {
        if !self.graph.contains(tile) {
            warn!(?tile, "Rejected unoccupy: unknown tile");
            return Err(GridError::UnknownTile(tile));
        }
        let Some(occupant) = self.occupant_at(tile) else {
            return Err(GridError::EmptyTile(tile));
        };

        self.emit(GridEvent::TileExited { occupant, tile });
        self.graph.set_occupant(tile, None)?;

        let mut is_wall = false;
        if let Some(occ) = self.occupants.get_mut(occupant) {
            if occ.tile() == Some(tile) {
                occ.set_tile(None);
            }
            is_wall = occ.kind() == OccupantKind::Wall;
        }
        if is_wall {
            self.feedback()
                .refresh_affordance(tile, AffordanceAnchor::Floor);
        }
        trace!(?occupant, ?tile, "Unoccupied");
        Ok(occupant)
    }

    /// Apply the effect of `occupant` arriving on `tile`.
    pub fn apply_entry_effect(&mut self, tile: TileId, occupant: OccupantId) -> Result<()> {
        match self.graph.try_tile(tile)?.kind() {
            TileKind::Hazard { entry_damage } => {
                self.apply_damage(occupant, entry_damage)?;
            }
            TileKind::Heal { amount } => {
                self.heal(occupant, amount)?;
            }
            TileKind::Standard | TileKind::Wall | TileKind::Teleport | TileKind::Removed => {}
        }
        Ok(())
    }

    /// Remove health. Returns true if this killed the occupant.
    ///
    /// Indestructible and already dead occupants are unaffected.
    pub fn apply_damage(&mut self, occupant: OccupantId, amount: u32) -> Result<bool> {
        let occ = self.occupant_mut(occupant)?;
        if !occ.is_alive() || amount == 0 {
            return Ok(false);
        }
        let Some(health) = occ.health_mut() else {
            return Ok(false);
        };
        let dealt = health.damage(amount);
        let remaining = health.current;

        self.emit(GridEvent::Damaged {
            occupant,
            amount: dealt,
            remaining,
        });
        self.feedback().show_damage(occupant, dealt);

        if remaining == 0 {
            self.kill(occupant)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Restore health up to the maximum. Returns the amount restored.
    pub fn heal(&mut self, occupant: OccupantId, amount: u32) -> Result<u32> {
        let occ = self.occupant_mut(occupant)?;
        if !occ.is_alive() {
            return Ok(0);
        }
        let healed = occ.health_mut().map_or(0, |h| h.heal(amount));
        if healed > 0 {
            self.emit(GridEvent::Healed {
                occupant,
                amount: healed,
            });
        }
        Ok(healed)
    }

    /// Mark an occupant dead and unbind it from its tile.
    ///
    /// The occupant stays in the roster until the simulation reaps it.
    pub fn kill(&mut self, occupant: OccupantId) -> Result<()> {
        let occ = self.occupant_mut(occupant)?;
        if !occ.is_alive() {
            return Ok(());
        }
        occ.mark_dead();
        if let Some(tile) = self.tile_of(occupant) {
            self.unoccupy(tile)?;
        }
        self.feedback().play_animation(occupant, AnimationCue::Death);
        self.emit(GridEvent::OccupantDied { occupant });
        debug!(?occupant, "Occupant died");
        Ok(())
    }

    /// Exchange the tiles of two occupants.
    pub fn swap_places(&mut self, a: OccupantId, b: OccupantId) -> Result<()> {
        let tile_a = self.tile_of(a).ok_or(GridError::UnknownOccupant(a))?;
        let tile_b = self.tile_of(b).ok_or(GridError::UnknownOccupant(b))?;
        if a == b {
            return Ok(());
        }
        self.unoccupy(tile_a)?;
        self.unoccupy(tile_b)?;
        self.occupy(tile_b, a)?;
        self.occupy(tile_a, b)?;
        debug!(?a, ?b, "Swapped places");
        Ok(())
    }
}
