//! Boundary shape profiling.
//!
//! For every boundary `k` of a sequence the profiler runs the prefix, feeds
//! the intermediate tensor to the suffix, and checks the result against one
//! full run. A mismatch means the flattened sequence does not reproduce the
//! monolithic model and the whole run is rejected.

use std::time::Instant;

use edgesplit_types::config::ProfilerConfig;
use edgesplit_types::{ShapeRecord, Tensor};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::executor::{full_run, prefix_run, suffix_run};
use crate::stage::StageSequence;

/// Profile every boundary of `sequence`. Returns `len + 1` records in
/// boundary order.
pub fn profile_shapes(
    sequence: &StageSequence,
    input: &Tensor,
    config: &ProfilerConfig,
) -> Result<Vec<ShapeRecord>> {
    let reference = full_run(sequence, input)?;
    let mut records = Vec::with_capacity(sequence.len() + 1);

    for k in 0..=sequence.len() {
        let started = Instant::now();
        let intermediate = prefix_run(sequence, k, input)?;
        let elapsed_us = started.elapsed().as_micros() as u64;

        let output = suffix_run(sequence, k, &intermediate)?;
        verify_decomposition(k, &output, &reference, config)?;

        debug!(
            boundary = k,
            shape = %intermediate.shape(),
            transfer_size = intermediate.shape().transfer_size(),
            elapsed_us,
            "boundary profiled"
        );
        records.push(ShapeRecord::new(k, intermediate.shape().clone(), elapsed_us));
    }

    info!(
        boundaries = records.len(),
        output_shape = %reference.shape(),
        "shape profiling complete"
    );
    Ok(records)
}

fn verify_decomposition(
    boundary: usize,
    output: &Tensor,
    reference: &Tensor,
    config: &ProfilerConfig,
) -> Result<()> {
    if output.shape() != reference.shape() {
        return Err(PipelineError::Decomposition {
            boundary,
            detail: format!(
                "split output shape {} differs from full run {}",
                output.shape(),
                reference.shape()
            ),
        });
    }

    if let Some(m) = output.first_mismatch(reference, config.abs_tolerance, config.rel_tolerance) {
        return Err(PipelineError::Decomposition {
            boundary,
            detail: format!(
                "element {} is {} but the full run produced {}",
                m.index, m.actual, m.expected
            ),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
