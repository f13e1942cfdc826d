//! Gap removal for position maps.

use serde::Serialize;
use tracing::debug;

use super::store::{LogicalPosition, PositionStore};
use crate::error::{Result, SchedulerError};

/// Options for a compression pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionOptions {
    /// Compute the result without mutating the store.
    pub dry_run: bool,
    /// Version the caller last observed. A mismatch aborts the pass.
    pub expected_version: Option<u64>,
}

impl CompressionOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Outcome of a compression pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    /// Logical span before compression (highest occupied position).
    pub original_count: u32,
    /// Logical span after compression; equals the stitch count.
    pub compressed_count: u32,
    pub gaps_removed: u32,
    /// `compressed_count / original_count`, or 1.0 for an empty map.
    pub ratio: f64,
    /// False for dry runs and for maps that were already gap-free.
    pub applied: bool,
    /// Store version after the pass.
    pub version: u64,
}

/// Renumbers occupied positions to `1..=n`, keeping their relative order.
///
/// Progress data is never touched; compression changes where a stitch sits,
/// not how far along it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCompressor;

impl PositionCompressor {
    pub fn new() -> Self {
        Self
    }

    pub fn compress_tube_positions(
        &self,
        store: &mut PositionStore,
        options: CompressionOptions,
    ) -> Result<CompressionResult> {
        if let Some(expected) = options.expected_version {
            if expected != store.version() {
                return Err(SchedulerError::CompressionWouldBreakOrdering {
                    tube: store.tube(),
                    reason: format!(
                        "map changed since it was read (expected version {}, found {})",
                        expected,
                        store.version()
                    ),
                });
            }
        }

        let original_count = store.span();
        let compressed_count = store.len() as u32;

        let mapping: Vec<(LogicalPosition, LogicalPosition)> = store
            .iter()
            .enumerate()
            .map(|(i, (old, _))| (old, LogicalPosition::new(i as u32 + 1)))
            .map(|(old, new)| new.map(|new| (old, new)))
            .collect::<Result<_>>()?;

        verify_order_preserved(store, &mapping)?;

        let gaps_removed = original_count - compressed_count;
        let ratio = if original_count == 0 {
            1.0
        } else {
            compressed_count as f64 / original_count as f64
        };

        let applied = !options.dry_run && gaps_removed > 0;
        if applied {
            store.apply_renumbering(&mapping);
            store.check_invariants()?;
            debug!(
                tube = %store.tube(),
                gaps_removed,
                span = compressed_count,
                "Compressed position map"
            );
        }

        Ok(CompressionResult {
            original_count,
            compressed_count,
            gaps_removed,
            ratio,
            applied,
            version: store.version(),
        })
    }
}

fn verify_order_preserved(
    store: &PositionStore,
    mapping: &[(LogicalPosition, LogicalPosition)],
) -> Result<()> {
    let monotonic = mapping
        .windows(2)
        .all(|pair| pair[0].0 < pair[1].0 && pair[0].1 < pair[1].1);
    if !monotonic || mapping.len() != store.len() {
        return Err(SchedulerError::CompressionWouldBreakOrdering {
            tube: store.tube(),
            reason: "renumbering is not order-preserving".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StitchId, TubeId};

    fn stitch(order: u32) -> StitchId {
        StitchId::new(TubeId::Tube3, "mul", order)
    }

    fn sparse(layout: &[(u32, u32)]) -> PositionStore {
        let mut store = PositionStore::new(TubeId::Tube3);
        for &(p, o) in layout {
            store
                .insert(LogicalPosition::new(p).unwrap(), stitch(o))
                .unwrap();
        }
        store
    }

    fn layout(store: &PositionStore) -> Vec<(u32, u32)> {
        store.iter().map(|(p, s)| (p.get(), s.order)).collect()
    }

    #[test]
    fn test_compress_removes_gaps_in_order() {
        let mut store = sparse(&[(1, 2), (3, 5), (8, 1), (15, 9)]);

        let result = PositionCompressor::new()
            .compress_tube_positions(&mut store, CompressionOptions::default())
            .unwrap();

        assert_eq!(layout(&store), vec![(1, 2), (2, 5), (3, 1), (4, 9)]);
        assert_eq!(result.original_count, 15);
        assert_eq!(result.compressed_count, 4);
        assert_eq!(result.gaps_removed, 11);
        assert!(result.applied);
        assert!((result.ratio - 4.0 / 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compress_gap_free_is_noop() {
        let mut store = sparse(&[(1, 1), (2, 2), (3, 3)]);
        let version = store.version();

        let result = PositionCompressor::new()
            .compress_tube_positions(&mut store, CompressionOptions::default())
            .unwrap();

        assert_eq!(result.gaps_removed, 0);
        assert!(!result.applied);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let mut store = sparse(&[(2, 1), (9, 2)]);
        let before = store.clone();

        let result = PositionCompressor::new()
            .compress_tube_positions(&mut store, CompressionOptions::dry_run())
            .unwrap();

        assert_eq!(result.gaps_removed, 7);
        assert!(!result.applied);
        assert_eq!(store, before);
    }

    #[test]
    fn test_stale_version_rejected() {
        let mut store = sparse(&[(1, 1), (5, 2)]);
        let stale = store.version() - 1;

        let err = PositionCompressor::new()
            .compress_tube_positions(
                &mut store,
                CompressionOptions::default().with_expected_version(stale),
            )
            .unwrap_err();

        assert_eq!(err.code(), "COMPRESSION_WOULD_BREAK_ORDERING");
        assert!(err.is_retryable());
        assert_eq!(store.span(), 5);
    }

    #[test]
    fn test_empty_store() {
        let mut store = PositionStore::new(TubeId::Tube1);
        let result = PositionCompressor::new()
            .compress_tube_positions(&mut store, CompressionOptions::default())
            .unwrap();
        assert_eq!(result.original_count, 0);
        assert_eq!(result.ratio, 1.0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn test_compression_idempotent_and_order_preserving(
                positions in proptest::collection::btree_set(1u32..500, 0..60)
            ) {
                let positions: BTreeSet<u32> = positions;
                let layout_in: Vec<(u32, u32)> = positions
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (*p, i as u32))
                    .collect();
                let mut store = sparse(&layout_in);
                let compressor = PositionCompressor::new();

                compressor
                    .compress_tube_positions(&mut store, CompressionOptions::default())
                    .unwrap();

                let orders: Vec<u32> = store.iter().map(|(_, s)| s.order).collect();
                let expected: Vec<u32> = (0..positions.len() as u32).collect();
                prop_assert_eq!(orders, expected);
                prop_assert_eq!(store.gap_count(), 0);

                let once = store.clone();
                let again = compressor
                    .compress_tube_positions(&mut store, CompressionOptions::default())
                    .unwrap();
                prop_assert_eq!(again.gaps_removed, 0);
                prop_assert_eq!(store, once);
            }
        }
    }
}
