pub mod item;
pub mod room;
pub mod types;
