//! Prefix/suffix execution over a shared stage sequence.
//!
//! The client side of a split runs [`prefix_run`] up to boundary `k`, ships
//! the intermediate tensor, and the server side finishes with [`suffix_run`].
//! Both are pure functions over `&StageSequence`; any number of them may run
//! concurrently against the same sequence.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use edgesplit_types::Tensor;

use crate::error::{PipelineError, Result};
use crate::stage::StageSequence;

/// Run stages `[0, k)`. Returns the input unchanged for `k = 0`.
pub fn prefix_run(sequence: &StageSequence, k: usize, input: &Tensor) -> Result<Tensor> {
    check_boundary(sequence, k)?;
    run_range(sequence, 0..k, input)
}

/// Run stages `[k, len)`. For `k = 0` this is the whole pipeline, which is
/// how full-pipeline baseline runs are issued.
pub fn suffix_run(sequence: &StageSequence, k: usize, input: &Tensor) -> Result<Tensor> {
    check_boundary(sequence, k)?;
    if k == 0 {
        return run_range(sequence, 0..sequence.len(), input);
    }
    run_range(sequence, k..sequence.len(), input)
}

/// Run every stage in order.
pub fn full_run(sequence: &StageSequence, input: &Tensor) -> Result<Tensor> {
    suffix_run(sequence, 0, input)
}

fn check_boundary(sequence: &StageSequence, k: usize) -> Result<()> {
    if k > sequence.len() {
        return Err(PipelineError::BoundaryOutOfRange {
            boundary: k,
            len: sequence.len(),
        });
    }
    Ok(())
}

fn run_range(sequence: &StageSequence, range: Range<usize>, input: &Tensor) -> Result<Tensor> {
    let mut x = input.clone();
    for index in range {
        let stage = sequence.stage(index).ok_or(PipelineError::BoundaryOutOfRange {
            boundary: index,
            len: sequence.len(),
        })?;
        x = stage.apply(&x).map_err(|e| {
            PipelineError::Execution(format!("stage {index} ({}): {e}", stage.name()))
        })?;
    }
    Ok(x)
}

// ── Split executor ────────────────────────────────────────────────────────────

/// Production-side handle: a shared sequence plus the set of boundaries the
/// profiler approved as split points.
#[derive(Debug, Clone)]
pub struct SplitExecutor {
    sequence: Arc<StageSequence>,
    /// `None` accepts every boundary in `[0, len]`.
    allowed: Option<BTreeSet<usize>>,
}

impl SplitExecutor {
    pub fn new(sequence: Arc<StageSequence>) -> Self {
        Self { sequence, allowed: None }
    }

    /// Restrict splits to the given boundaries (typically a manifest).
    pub fn with_boundaries(
        sequence: Arc<StageSequence>,
        boundaries: impl IntoIterator<Item = usize>,
    ) -> Result<Self> {
        let allowed: BTreeSet<usize> = boundaries.into_iter().collect();
        if let Some(&max) = allowed.iter().next_back() {
            check_boundary(&sequence, max)?;
        }
        Ok(Self {
            sequence,
            allowed: Some(allowed),
        })
    }

    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    pub fn boundaries(&self) -> Vec<usize> {
        match &self.allowed {
            Some(set) => set.iter().copied().collect(),
            None => (0..=self.sequence.len()).collect(),
        }
    }

    /// Client half: stages before boundary `k`.
    pub fn run_client(&self, k: usize, input: &Tensor) -> Result<Tensor> {
        self.check_allowed(k)?;
        prefix_run(&self.sequence, k, input)
    }

    /// Server half: stages from boundary `k` on.
    pub fn run_server(&self, k: usize, input: &Tensor) -> Result<Tensor> {
        self.check_allowed(k)?;
        suffix_run(&self.sequence, k, input)
    }

    fn check_allowed(&self, k: usize) -> Result<()> {
        match &self.allowed {
            Some(set) if !set.contains(&k) => Err(PipelineError::UnknownBoundary(k)),
            _ => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageRef};
    use edgesplit_types::Shape;

    /// `x * factor + offset`, element-wise.
    struct Affine {
        name: String,
        factor: f32,
        offset: f32,
    }

    impl Stage for Affine {
        fn name(&self) -> &str {
            &self.name
        }

        fn apply(&self, input: &Tensor) -> Result<Tensor> {
            let data = input.data().iter().map(|v| v * self.factor + self.offset).collect();
            Ok(Tensor::new(input.shape().clone(), data)?)
        }
    }

    struct Fails;

    impl Stage for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        fn apply(&self, _input: &Tensor) -> Result<Tensor> {
            Err(PipelineError::Execution("kernel exploded".into()))
        }
    }

    fn affine_sequence() -> StageSequence {
        let stages: Vec<StageRef> = (0..4)
            .map(|i| {
                Arc::new(Affine {
                    name: format!("affine{i}"),
                    factor: 2.0,
                    offset: i as f32,
                }) as StageRef
            })
            .collect();
        StageSequence::new(stages)
    }

    fn input() -> Tensor {
        Tensor::from_fn(Shape::new([1, 4]), |i| i as f32)
    }

    #[test]
    fn prefix_zero_returns_input() {
        let seq = affine_sequence();
        assert_eq!(prefix_run(&seq, 0, &input()).unwrap(), input());
    }

    #[test]
    fn suffix_zero_runs_everything() {
        let seq = affine_sequence();
        let full = full_run(&seq, &input()).unwrap();
        assert_eq!(suffix_run(&seq, 0, &input()).unwrap(), full);
        // ((((0*2+0)*2+1)*2+2)*2+3) = 11
        assert_eq!(full.data()[0], 11.0);
    }

    #[test]
    fn prefix_then_suffix_equals_full_for_every_boundary() {
        let seq = affine_sequence();
        let full = full_run(&seq, &input()).unwrap();
        for k in 0..=seq.len() {
            let mid = prefix_run(&seq, k, &input()).unwrap();
            assert_eq!(suffix_run(&seq, k, &mid).unwrap(), full, "boundary {k}");
        }
    }

    #[test]
    fn suffix_at_end_is_identity() {
        let seq = affine_sequence();
        let t = input();
        assert_eq!(suffix_run(&seq, seq.len(), &t).unwrap(), t);
    }

    #[test]
    fn out_of_range_boundary() {
        let seq = affine_sequence();
        let err = prefix_run(&seq, 5, &input()).unwrap_err();
        assert!(matches!(err, PipelineError::BoundaryOutOfRange { boundary: 5, len: 4 }));
        assert!(suffix_run(&seq, 5, &input()).is_err());
    }

    #[test]
    fn stage_failure_names_the_stage() {
        let seq = StageSequence::new(vec![Arc::new(Fails)]);
        let err = full_run(&seq, &input()).unwrap_err();
        assert!(err.to_string().contains("stage 0 (fails)"));
    }

    #[test]
    fn concurrent_runs_do_not_interfere() {
        let seq = Arc::new(affine_sequence());
        let full = full_run(&seq, &input()).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..=seq.len())
                .map(|k| {
                    let seq = Arc::clone(&seq);
                    scope.spawn(move || {
                        let mid = prefix_run(&seq, k, &input()).unwrap();
                        suffix_run(&seq, k, &mid).unwrap()
                    })
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), full);
            }
        });
    }

    #[test]
    fn split_executor_enforces_manifest_boundaries() {
        let seq = Arc::new(affine_sequence());
        let exec = SplitExecutor::with_boundaries(Arc::clone(&seq), [0, 2, 4]).unwrap();
        assert_eq!(exec.boundaries(), vec![0, 2, 4]);

        let mid = exec.run_client(2, &input()).unwrap();
        let out = exec.run_server(2, &mid).unwrap();
        assert_eq!(out, full_run(&seq, &input()).unwrap());

        assert!(matches!(exec.run_client(1, &input()), Err(PipelineError::UnknownBoundary(1))));
        assert!(SplitExecutor::with_boundaries(seq, [9]).is_err());
    }

    #[test]
    fn unrestricted_executor_accepts_all_boundaries() {
        let exec = SplitExecutor::new(Arc::new(affine_sequence()));
        assert_eq!(exec.boundaries(), vec![0, 1, 2, 3, 4]);
        assert!(exec.run_client(3, &input()).is_ok());
    }
}
