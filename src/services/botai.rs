use crate::models::types::{HabboId, RoomId};

/// Bot/pet AI hook points. The room core notifies; it never depends on
/// anything the listener computes.
pub trait BotListener: Send + Sync {
    fn on_user_say(&self, _room: RoomId, _speaker: HabboId, _message: &str) {}
    fn on_bot_deployed(&self, _room: RoomId, _bot: HabboId) {}
    fn on_bot_removed(&self, _room: RoomId, _bot: HabboId) {}
}
