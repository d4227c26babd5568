pub mod registry;

pub use registry::{Registry, Repos};
