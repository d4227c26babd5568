pub mod grid;
pub mod manager;
pub mod room;
pub mod template;
pub mod trade;
pub mod user;
