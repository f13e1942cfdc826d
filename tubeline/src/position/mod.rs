//! Per-tube logical position maps.
//!
//! A tube's sequence is a sparse map from [`LogicalPosition`] to stitch.
//! Gaps are allowed and carry ordering meaning only. The lowest occupied
//! position holds the tube's active stitch.
//!
//! - [`PositionStore`] - the map itself, with a reverse index for lookups
//! - [`PositionCompressor`] - renumbers a map to remove gaps

mod compressor;
mod store;

pub use compressor::{CompressionOptions, CompressionResult, PositionCompressor};
pub use store::{LogicalPosition, PositionEntry, PositionStore, PositionStoreSnapshot};
