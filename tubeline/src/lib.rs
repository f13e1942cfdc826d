//! Tubeline - spaced-repetition scheduling for three-tube learning sessions
//!
//! This library provides the scheduling engine behind a learning application
//! that interleaves three "tubes" of content. Each tube is a sparse sequence
//! of stitches (content specifications); completing a stitch moves it further
//! down its tube according to a fixed skip-number progression, and the three
//! tubes rotate through LIVE / READY / PREPARING roles so the next tube's
//! content is always assembled before the learner needs it.
//!
//! # Architecture
//!
//! ```text
//! SessionCompletion ──► RepositioningEngine ──► PositionStore (per tube)
//!                          │                         │
//!                          ▼                         ▼
//!              SkipProgressionCalculator     PositionCompressor
//!                                                    │
//!                                                    ▼
//!                                     TubeRotationController
//!                                                    │
//!                                                    ▼
//!                                  ContentPreparationCoordinator
//!                                                    │
//!                                                    ▼
//!                                        ContentReadyCache
//! ```
//!
//! [`scheduler::LearningScheduler`] wires the components together. All
//! collaborators (state store, content generator, configuration) are passed
//! in explicitly; there is no global registry.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tubeline::config::SchedulerConfig;
//! use tubeline::persistence::MemoryStateStore;
//! use tubeline::preparation::FactPoolGenerator;
//! use tubeline::scheduler::LearningScheduler;
//!
//! let scheduler = LearningScheduler::new(
//!     SchedulerConfig::default(),
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(FactPoolGenerator::new(facts)),
//! );
//! scheduler.initialize_user(user.clone(), seed)?;
//! let outcome = scheduler.complete_session(&completion)?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod position;
pub mod preparation;
pub mod progression;
pub mod reposition;
pub mod rotation;
pub mod scheduler;
pub mod tube;
pub mod user;

pub use error::{ErrorKind, Result, SchedulerError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
