use crate::models::types::{HabboId, ItemId, RoomId};
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Room is not loaded or does not exist
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// Room model/template could not be resolved
    #[error("room model not found: {0}")]
    ModelNotFound(String),

    /// Occupant is not present in the room
    #[error("user {user} not in room {room}")]
    UserNotInRoom { user: HabboId, room: RoomId },

    /// Inventory no longer holds an item a trade promised to deliver
    #[error("item {item} missing from inventory of {owner}")]
    ItemNotOwned { owner: HabboId, item: ItemId },

    /// Permission is denied
    #[error("permission denied")]
    PermissionDenied,

    /// Some precondition failed
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
