//! Boundary candidate reduction.
//!
//! Algorithm:
//! 1. Keep boundary 0 (send the raw input) unconditionally.
//! 2. Drop intermediate boundaries whose transfer size is not strictly below
//!    boundary 0's; shipping something bigger than the input never helps.
//! 3. Keep only the first survivor of each transfer size. This collapses
//!    runs from volume-preserving stages (activations, reshapes) and also
//!    drops a size that reappears later in the pipeline.
//! 4. Keep the final boundary (fully local execution) unconditionally.

use std::collections::HashSet;

use edgesplit_types::{BoundaryCandidate, ShapeRecord};
use tracing::debug;

/// Reduce per-boundary shape records to useful split candidates.
///
/// `records` must be in boundary order, as produced by
/// [`crate::profiler::profile_shapes`].
pub fn reduce_candidates(records: &[ShapeRecord]) -> Vec<BoundaryCandidate> {
    let Some((first, rest)) = records.split_first() else {
        return Vec::new();
    };

    let mut kept = vec![BoundaryCandidate::from(first)];
    let Some((last, middle)) = rest.split_last() else {
        return kept;
    };

    let input_size = first.transfer_size;
    let mut seen: HashSet<u64> = HashSet::from([input_size]);

    for record in middle {
        if record.transfer_size >= input_size {
            debug!(boundary = record.boundary, size = record.transfer_size, "dominated by input");
            continue;
        }
        if !seen.insert(record.transfer_size) {
            debug!(boundary = record.boundary, size = record.transfer_size, "duplicate size");
            continue;
        }
        kept.push(BoundaryCandidate::from(record));
    }

    kept.push(BoundaryCandidate::from(last));
    kept
}

// ── Tests ─────────────────────────────────────────────────────────────────────
