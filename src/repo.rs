pub mod inventory;
pub mod mem;
pub mod room;

pub use inventory::InventoryRepo;
pub use mem::{MemoryInventory, MemoryRoomRepo};
pub use room::{RoomModelData, RoomRepo};
