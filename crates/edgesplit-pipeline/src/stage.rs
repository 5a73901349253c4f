//! Opaque computational stages and the flat sequence they form.
//!
//! Stage kernels (convolutions, activations, dense layers) live in an external
//! model repository. This module only defines the capability a stage exposes
//! and the two synthetic stages the graph builder can introduce itself.

use std::fmt;
use std::sync::Arc;

use edgesplit_types::{Shape, Tensor};

use crate::error::{PipelineError, Result};
use crate::graph::PipelineHierarchy;

// ── Stage ─────────────────────────────────────────────────────────────────────

/// One deterministic, side-effect-free unit of computation.
///
/// Implementations must be pure: the same input always yields the same
/// output, and concurrent calls must not interfere.
pub trait Stage: Send + Sync {
    /// Human-readable label used in logs and error messages.
    fn name(&self) -> &str;

    fn apply(&self, input: &Tensor) -> Result<Tensor>;
}

/// Shared handle to a stage owned by the model repository.
pub type StageRef = Arc<dyn Stage>;

/// Source of pipeline descriptions. Supplied externally; never mutated here.
pub trait ModelRepository {
    fn model_name(&self) -> &str;

    fn pipeline_hierarchy(&self) -> Result<PipelineHierarchy>;
}

// ── Stage Sequence ────────────────────────────────────────────────────────────

/// Ordered, immutable list of stages in model execution order.
#[derive(Clone)]
pub struct StageSequence {
    stages: Vec<StageRef>,
}

impl StageSequence {
    pub fn new(stages: Vec<StageRef>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&StageRef> {
        self.stages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageRef> {
        self.stages.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for StageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSequence")
            .field("stages", &self.names())
            .finish()
    }
}

// ── Synthetic stages ──────────────────────────────────────────────────────────

/// Collapses every non-batch dimension into one feature dimension.
///
/// `[N, C, H, W] → [N, C·H·W]`. Tensors of rank ≤ 2 pass through unchanged.
#[derive(Debug, Default)]
pub struct ReshapeStage;

impl Stage for ReshapeStage {
    fn name(&self) -> &str {
        "flatten"
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let dims = input.shape().dims();
        if dims.len() <= 2 {
            return Ok(input.clone());
        }
        let features: usize = dims[1..].iter().product();
        let flat = input.clone().reshape(Shape::new([dims[0], features]))?;
        Ok(flat)
    }
}

/// A nested composite kept as a single stage: runs its children in order.
pub struct SequentialStage {
    name: String,
    children: Vec<StageRef>,
}

impl SequentialStage {
    pub fn new(name: impl Into<String>, children: Vec<StageRef>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    pub fn children(&self) -> &[StageRef] {
        &self.children
    }
}

impl Stage for SequentialStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for child in &self.children {
            x = child.apply(&x).map_err(|e| {
                PipelineError::Execution(format!("{} > {}: {e}", self.name, child.name()))
            })?;
        }
        Ok(x)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct AddOne;

    impl Stage for AddOne {
        fn name(&self) -> &str {
            "add_one"
        }

        fn apply(&self, input: &Tensor) -> Result<Tensor> {
            let data = input.data().iter().map(|v| v + 1.0).collect();
            Ok(Tensor::new(input.shape().clone(), data)?)
        }
    }

    #[test]
    fn reshape_flattens_spatial_dims() {
        let t = Tensor::from_fn(Shape::new([2, 3, 4, 4]), |i| i as f32);
        let out = ReshapeStage.apply(&t).unwrap();
        assert_eq!(out.shape(), &Shape::new([2, 48]));
        assert_eq!(out.data(), t.data());
    }

    #[test]
    fn reshape_is_identity_on_rank_two() {
        let t = Tensor::from_fn(Shape::new([1, 512]), |i| i as f32);
        let out = ReshapeStage.apply(&t).unwrap();
        assert_eq!(out, t);
    }

    #[test]
    fn sequential_runs_children_in_order() {
        let seq = SequentialStage::new("block", vec![Arc::new(AddOne), Arc::new(AddOne)]);
        let t = Tensor::zeros(Shape::new([1, 2]));
        let out = seq.apply(&t).unwrap();
        assert_eq!(out.data(), &[2.0, 2.0]);
        assert_eq!(seq.name(), "block");
        assert_eq!(seq.children().len(), 2);
    }

    #[test]
    fn sequence_debug_lists_names() {
        let s = StageSequence::new(vec![Arc::new(AddOne), Arc::new(ReshapeStage)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.names(), vec!["add_one", "flatten"]);
        assert!(format!("{s:?}").contains("flatten"));
    }
}
