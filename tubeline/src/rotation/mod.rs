//! Three-tube rotation ("Live Aid").
//!
//! Each learner has three tubes. At any time one is LIVE (being studied),
//! one is READY (content assembled, next up) and one is PREPARING (content
//! being assembled). A rotation moves every tube one role along:
//!
//! ```text
//!   LIVE ──► PREPARING ──► READY ──► LIVE
//! ```

mod controller;
mod live_aid;

pub use controller::{RotationOutcome, TubeRotationController};
pub use live_aid::{LiveAidRotationResult, LiveAidState, RotationTrigger, TubeState, TubeTransition};
