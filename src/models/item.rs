use crate::codec::MessageComposer;
use crate::models::types::{HabboId, ItemBaseId, ItemId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How an item behaves once placed. The room core only dispatches on the
/// variants that affect the grid or posture; everything else is `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionType {
    Default,
    Seat,
    Bed,
    Gate,
    Dimmer,
}

/// Immutable catalogue definition shared by every instance of a furni type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBase {
    pub id: ItemBaseId,
    pub sprite_id: i32,
    pub name: String,
    pub width: i32,
    pub length: i32,
    pub height: f32,
    pub can_sit: bool,
    pub can_trade: bool,
    pub interaction: InteractionType,
}

/// One placed (or tradeable) furni instance.
#[derive(Debug, Clone)]
pub struct RoomItem {
    pub id: ItemId,
    pub base: Arc<ItemBase>,
    pub owner_id: HabboId,
    pub x: i32,
    pub y: i32,
    pub z: f32,
    pub rotation: i32,
    /// Wall items carry a client-side placement string and no grid position.
    pub wall_position: Option<String>,
}

impl RoomItem {
    pub fn is_wall_item(&self) -> bool {
        self.wall_position.is_some()
    }

    pub fn is_sittable(&self) -> bool {
        self.base.can_sit || self.base.interaction == InteractionType::Seat
    }

    /// Footprint dimensions after rotation. Rotations 0 and 4 keep the
    /// catalogue width x length orientation; 2 and 6 swap them.
    fn oriented_size(&self) -> (i32, i32) {
        match self.rotation {
            2 | 6 => (self.base.length, self.base.width),
            _ => (self.base.width, self.base.length),
        }
    }

    /// Every tile this floor item occupies. Empty for wall items.
    pub fn footprint(&self) -> Vec<(i32, i32)> {
        if self.is_wall_item() {
            return Vec::new();
        }
        let (w, l) = self.oriented_size();
        let mut tiles = Vec::with_capacity((w * l).max(1) as usize);
        for dx in 0..w.max(1) {
            for dy in 0..l.max(1) {
                tiles.push((self.x + dx, self.y + dy));
            }
        }
        tiles
    }

    pub fn covers(&self, x: i32, y: i32) -> bool {
        if self.is_wall_item() {
            return false;
        }
        let (w, l) = self.oriented_size();
        x >= self.x && x < self.x + w.max(1) && y >= self.y && y < self.y + l.max(1)
    }

    /// Total height of the stack surface this item presents.
    pub fn top_height(&self) -> f32 {
        self.z + self.base.height
    }

    pub fn compose(&self, c: &mut MessageComposer) {
        c.append_uint(self.id.raw() as u32);
        c.append_int(self.base.sprite_id);
        if let Some(wall) = &self.wall_position {
            c.append_string(wall);
        } else {
            c.append_int(self.x);
            c.append_int(self.y);
            c.append_int(self.rotation);
            c.append_string(&format!("{:.2}", self.z));
        }
    }
}
