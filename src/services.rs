pub mod botai;
pub mod commands;
pub mod pathfinder;

pub use botai::BotListener;
pub use commands::{ChatCommandHandler, NullCommandHandler};
pub use pathfinder::{BfsPathfinder, Pathfinder};
