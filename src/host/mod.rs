//! Host environments for the trade core

pub mod memory;
pub mod scheduler;
pub mod simulation;

pub use memory::{InMemoryHost, Notice, SharedContainer, SimActor, WorldDrop, STORAGE_SLOTS};
pub use scheduler::{FiredTimer, ManualScheduler, TokioScheduler};
pub use simulation::Simulation;
