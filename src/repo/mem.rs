//! DashMap-backed repositories. These carry the tests and the demo boot;
//! a SQL-backed pair would implement the same traits.

use crate::error::{AppResult, DomainError};
use crate::models::item::{ItemBase, RoomItem};
use crate::models::room::RoomConfig;
use crate::models::types::{HabboId, ItemId, RoomId};
use crate::repo::inventory::InventoryRepo;
use crate::repo::room::{RoomModelData, RoomRepo};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct MemoryRoomRepo {
    configs: DashMap<RoomId, RoomConfig>,
    models: DashMap<String, RoomModelData>,
    items: DashMap<RoomId, Vec<RoomItem>>,
    rights: DashMap<RoomId, Vec<HabboId>>,
    unit_positions: DashMap<(RoomId, HabboId), (i32, i32)>,
}

impl MemoryRoomRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_config(&self, config: RoomConfig) {
        self.configs.insert(config.id, config);
    }

    pub fn insert_model(&self, name: &str, model: RoomModelData) {
        self.models.insert(name.to_string(), model);
    }

    pub fn insert_item(&self, room: RoomId, item: RoomItem) {
        self.items.entry(room).or_default().push(item);
    }

    pub fn grant_rights(&self, room: RoomId, user: HabboId) {
        self.rights.entry(room).or_default().push(user);
    }

    pub fn unit_position(&self, room: RoomId, unit: HabboId) -> Option<(i32, i32)> {
        self.unit_positions.get(&(room, unit)).map(|p| *p)
    }
}

#[async_trait]
impl RoomRepo for MemoryRoomRepo {
    async fn load_config(&self, id: RoomId) -> AppResult<Option<RoomConfig>> {
        Ok(self.configs.get(&id).map(|c| c.clone()))
    }

    async fn load_model(&self, name: &str) -> AppResult<Option<RoomModelData>> {
        Ok(self.models.get(name).map(|m| m.clone()))
    }

    async fn load_items(&self, id: RoomId) -> AppResult<Vec<RoomItem>> {
        Ok(self.items.get(&id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn load_rights(&self, id: RoomId) -> AppResult<Vec<HabboId>> {
        Ok(self.rights.get(&id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn save_config(&self, config: &RoomConfig) -> AppResult<()> {
        self.configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn save_item(&self, room: RoomId, item: &RoomItem) -> AppResult<()> {
        let mut items = self.items.entry(room).or_default();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => *slot = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn delete_item(&self, item: ItemId) -> AppResult<()> {
        for mut items in self.items.iter_mut() {
            items.retain(|i| i.id != item);
        }
        Ok(())
    }

    async fn save_unit_position(
        &self,
        room: RoomId,
        unit: HabboId,
        x: i32,
        y: i32,
    ) -> AppResult<()> {
        self.unit_positions.insert((room, unit), (x, y));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryInventory {
    hands: DashMap<HabboId, HashMap<ItemId, Arc<ItemBase>>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn give(&self, owner: HabboId, item: ItemId, base: Arc<ItemBase>) {
        self.hands.entry(owner).or_default().insert(item, base);
    }

    pub fn take(&self, owner: HabboId, item: ItemId) {
        if let Some(mut hand) = self.hands.get_mut(&owner) {
            hand.remove(&item);
        }
    }

    /// Sorted snapshot of one hand, for equality assertions in tests.
    pub fn snapshot(&self, owner: HabboId) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self
            .hands
            .get(&owner)
            .map(|hand| hand.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[async_trait]
impl InventoryRepo for MemoryInventory {
    async fn owns(&self, owner: HabboId, item: ItemId) -> AppResult<bool> {
        Ok(self.hands.get(&owner).is_some_and(|hand| hand.contains_key(&item)))
    }

    async fn item_base(
        &self,
        owner: HabboId,
        item: ItemId,
    ) -> AppResult<Option<Arc<ItemBase>>> {
        Ok(self.hands.get(&owner).and_then(|hand| hand.get(&item).cloned()))
    }

    async fn transfer(&self, from: HabboId, to: HabboId, items: &[ItemId]) -> AppResult<()> {
        // Verify the whole batch before moving anything.
        {
            let Some(hand) = self.hands.get(&from) else {
                return Err(DomainError::ItemNotOwned {
                    owner: from,
                    item: *items.first().unwrap_or(&ItemId(0)),
                });
            };
            for item in items {
                if !hand.contains_key(item) {
                    return Err(DomainError::ItemNotOwned { owner: from, item: *item });
                }
            }
        }

        let mut moved = Vec::with_capacity(items.len());
        if let Some(mut hand) = self.hands.get_mut(&from) {
            for item in items {
                if let Some(base) = hand.remove(item) {
                    moved.push((*item, base));
                }
            }
        }
        let mut target = self.hands.entry(to).or_default();
        for (item, base) in moved {
            target.insert(item, base);
        }
        Ok(())
    }
}
