use crate::error::AppResult;
use crate::models::item::RoomItem;
use crate::models::room::RoomConfig;
use crate::models::types::{HabboId, ItemId, RoomId};
use crate::rooms::template::DoorSpec;
use async_trait::async_trait;

/// Raw model blobs as stored: the heightmap text, the door, and the encoded
/// static furniture stream. `RoomTemplate::parse` turns this into a grid.
#[derive(Debug, Clone)]
pub struct RoomModelData {
    pub heightmap: String,
    pub door: DoorSpec,
    pub static_furniture: Vec<u8>,
    pub club_only: bool,
}

/// Persistence collaborator for rooms. Bans are deliberately absent: they
/// live in memory only and lapse on their own.
#[async_trait]
pub trait RoomRepo: Send + Sync {
    async fn load_config(&self, id: RoomId) -> AppResult<Option<RoomConfig>>;
    async fn load_model(&self, name: &str) -> AppResult<Option<RoomModelData>>;
    async fn load_items(&self, id: RoomId) -> AppResult<Vec<RoomItem>>;
    async fn load_rights(&self, id: RoomId) -> AppResult<Vec<HabboId>>;

    async fn save_config(&self, config: &RoomConfig) -> AppResult<()>;
    async fn save_item(&self, room: RoomId, item: &RoomItem) -> AppResult<()>;
    async fn delete_item(&self, item: ItemId) -> AppResult<()>;

    /// Persist where a bot or pet ended up; humans are never position-saved.
    async fn save_unit_position(&self, room: RoomId, unit: HabboId, x: i32, y: i32)
    -> AppResult<()>;
}
