//! Derived walkability view of one loaded room.
//!
//! The template says what the floor itself allows; the grid folds in the
//! furniture currently placed and where everyone is standing. It is rebuilt
//! on demand — sequencing a rebuild after an item change is the caller's
//! contract, the grid itself never watches for mutations.

use crate::models::item::{InteractionType, RoomItem};
use crate::models::types::HabboId;
use crate::rooms::template::{RoomTemplate, TileState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTile {
    Open,
    Blocked,
    Seat,
    Bed,
}

#[derive(Debug, Clone)]
pub struct TileGrid {
    pub width: i32,
    pub height: i32,
    states: Vec<GridTile>,
    heights: Vec<f32>,
    occupants: Vec<Option<HabboId>>,
}

impl TileGrid {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            states: Vec::new(),
            heights: Vec::new(),
            occupants: Vec::new(),
        }
    }

    pub fn build(
        template: &RoomTemplate,
        items: &[RoomItem],
        occupants: &[(HabboId, i32, i32)],
    ) -> Self {
        let size = (template.width * template.height).max(0) as usize;
        let mut grid = Self {
            width: template.width,
            height: template.height,
            states: vec![GridTile::Blocked; size],
            heights: vec![0.0; size],
            occupants: vec![None; size],
        };

        for x in 0..template.width {
            for y in 0..template.height {
                let idx = grid.index(x, y);
                grid.states[idx] = match template.tile_state(x, y) {
                    TileState::Open => GridTile::Open,
                    TileState::Blocked => GridTile::Blocked,
                    TileState::Seat => GridTile::Seat,
                };
                grid.heights[idx] = template.floor_height(x, y);
            }
        }

        for item in items.iter().filter(|i| !i.is_wall_item()) {
            let tile = if item.base.interaction == InteractionType::Bed {
                GridTile::Bed
            } else if item.is_sittable() {
                GridTile::Seat
            } else {
                GridTile::Blocked
            };
            for (x, y) in item.footprint() {
                if !grid.in_bounds(x, y) {
                    continue;
                }
                let idx = grid.index(x, y);
                grid.states[idx] = tile;
                if grid.heights[idx] < item.top_height() {
                    grid.heights[idx] = item.top_height();
                }
            }
        }

        for &(id, x, y) in occupants {
            if grid.in_bounds(x, y) {
                let idx = grid.index(x, y);
                grid.occupants[idx] = Some(id);
            }
        }

        grid
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (x * self.height + y) as usize
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    pub fn state(&self, x: i32, y: i32) -> GridTile {
        if !self.in_bounds(x, y) {
            return GridTile::Blocked;
        }
        self.states[self.index(x, y)]
    }

    /// Effective surface height: floor, or the top of the tallest item.
    pub fn height_at(&self, x: i32, y: i32) -> f32 {
        if !self.in_bounds(x, y) {
            return 0.0;
        }
        self.heights[self.index(x, y)]
    }

    pub fn occupant(&self, x: i32, y: i32) -> Option<HabboId> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.occupants[self.index(x, y)]
    }

    /// Whether the tile itself can be stepped on (occupancy not considered).
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.state(x, y) != GridTile::Blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemBase;
    use crate::models::types::{HabboId, ItemBaseId, ItemId};
    use crate::rooms::template::DoorSpec;
    use std::sync::Arc;

    fn mk_template() -> RoomTemplate {
        RoomTemplate::parse(
            "m",
            "000\r0000",
            DoorSpec { x: 0, y: 0, z: 0.0, direction: 2 },
            false,
        )
    }

    fn mk_item(can_sit: bool, interaction: InteractionType, x: i32, y: i32) -> RoomItem {
        RoomItem {
            id: ItemId(9),
            base: Arc::new(ItemBase {
                id: ItemBaseId(1),
                sprite_id: 13,
                name: "thing".into(),
                width: 1,
                length: 1,
                height: 0.5,
                can_sit,
                can_trade: true,
                interaction,
            }),
            owner_id: HabboId(1),
            x,
            y,
            z: 0.0,
            rotation: 0,
            wall_position: None,
        }
    }

    #[test]
    fn items_refine_the_template() {
        let t = mk_template();
        let items = vec![
            mk_item(false, InteractionType::Default, 0, 1),
            mk_item(true, InteractionType::Seat, 1, 1),
            mk_item(false, InteractionType::Bed, 2, 1),
        ];
        let grid = TileGrid::build(&t, &items, &[]);

        assert_eq!(grid.state(0, 1), GridTile::Blocked);
        assert_eq!(grid.state(1, 1), GridTile::Seat);
        assert_eq!(grid.state(2, 1), GridTile::Bed);
        assert_eq!(grid.state(0, 0), GridTile::Open);
        assert_eq!(grid.height_at(1, 1), 0.5);
    }

    #[test]
    fn occupants_are_recorded() {
        let t = mk_template();
        let grid = TileGrid::build(&t, &[], &[(HabboId(4), 2, 0)]);
        assert_eq!(grid.occupant(2, 0), Some(HabboId(4)));
        assert_eq!(grid.occupant(0, 0), None);
        // Out of bounds reads are inert.
        assert_eq!(grid.occupant(9, 9), None);
        assert!(!grid.is_walkable(-1, 0));
    }
}
