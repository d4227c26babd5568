pub mod codec;
pub mod config;
pub mod error;
pub mod game;
pub mod models;
pub mod repo;
pub mod rooms;
pub mod services;
pub mod state;

// Convenient re-exports (so call sites can do `hotelier::Registry`, etc.)
pub use error::{AppResult, DomainError};
pub use rooms::manager::RoomManager;
pub use rooms::room::{Room, RoomDeps};
pub use state::{Registry, Repos};
