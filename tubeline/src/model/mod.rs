//! Core domain types: identifiers, stitches, progress, and session results.

mod ids;
mod session;
mod skip;
mod stitch;

pub use ids::{StitchId, TubeId, UserId};
pub use session::{SessionCompletion, SessionResult, SessionScore};
pub use skip::{SkipNumber, SKIP_SEQUENCE};
pub use stitch::{BoundaryLevel, Stitch, StitchProgress};
