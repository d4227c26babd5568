use crate::error::AppResult;
use crate::models::item::ItemBase;
use crate::models::types::{HabboId, ItemId};
use async_trait::async_trait;

/// Hand (inventory) collaborator. Trade delivery runs through this trait and
/// relies on `transfer` being all-or-nothing.
#[async_trait]
pub trait InventoryRepo: Send + Sync {
    async fn owns(&self, owner: HabboId, item: ItemId) -> AppResult<bool>;

    /// Catalogue definition of an item in someone's hand, if present.
    async fn item_base(&self, owner: HabboId, item: ItemId)
    -> AppResult<Option<std::sync::Arc<ItemBase>>>;

    /// Move `items` from one hand to the other. Either every item moves or
    /// none does; a missing item fails the whole call.
    async fn transfer(&self, from: HabboId, to: HabboId, items: &[ItemId]) -> AppResult<()>;
}
