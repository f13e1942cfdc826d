//! Background content preparation.
//!
//! When a tube rotates into PREPARING, its active stitch's questions are
//! assembled ahead of time so the tube is ready by the time it goes LIVE.
//!
//! - [`ContentPreparationCoordinator`] - schedules and tracks processes
//! - [`PreparationProcess`] - observable state of one process
//! - [`ContentGenerator`] - the question-building boundary
//! - [`FactPoolGenerator`] - in-memory generator over a fact pool

mod coordinator;
mod generator;
mod process;

pub use coordinator::ContentPreparationCoordinator;
pub use generator::{
    ContentGenerator, Fact, FactPoolGenerator, GenerationError, GenerationRequest, Question,
    DEFAULT_MAX_REPEATS_PER_FACT,
};
pub use process::{
    PreparationEvent, PreparationPriority, PreparationProcess, PreparationRequest,
    PreparationStage, PreparationStatus, ProcessId,
};
