// Offline profiling artifacts.
//
// Produced by `edgesplit-pipeline` once per model version and consumed by the
// external split selector. Immutable once written.

use serde::{Deserialize, Serialize};

use crate::tensor::Shape;

// ── Shape Record ──────────────────────────────────────────────────────────────

/// Shape of the tensor crossing one boundary of a stage sequence.
///
/// Boundary `k` sits between stage `k - 1` and stage `k`; boundary 0 is the
/// raw input and boundary `len` is the final output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub boundary: usize,
    pub shape: Shape,
    /// Product of all dimensions of `shape`.
    pub transfer_size: u64,
    /// Wall-clock time of the prefix run that produced this tensor.
    pub prefix_elapsed_us: u64,
}

impl ShapeRecord {
    pub fn new(boundary: usize, shape: Shape, prefix_elapsed_us: u64) -> Self {
        let transfer_size = shape.transfer_size();
        Self {
            boundary,
            shape,
            transfer_size,
            prefix_elapsed_us,
        }
    }
}

// ── Boundary Candidate ────────────────────────────────────────────────────────

/// A boundary retained as a useful split point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    pub boundary: usize,
    pub shape: Shape,
    pub transfer_size: u64,
}

impl From<&ShapeRecord> for BoundaryCandidate {
    fn from(r: &ShapeRecord) -> Self {
        Self {
            boundary: r.boundary,
            shape: r.shape.clone(),
            transfer_size: r.transfer_size,
        }
    }
}

// ── Profile Report ────────────────────────────────────────────────────────────

/// Everything one profiling run learned about a model.
///
/// Serialized as CBOR next to the text manifest; JSON for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    /// Human-readable model identifier (e.g. `"resnet50"`).
    pub model_name: String,
    /// Number of stages in the flattened sequence.
    pub num_stages: usize,
    /// One record per boundary, `num_stages + 1` entries.
    pub records: Vec<ShapeRecord>,
    /// Reduced split points, in boundary order.
    pub candidates: Vec<BoundaryCandidate>,
    pub created_at: String,
}

impl ProfileReport {
    pub fn new(
        model_name: impl Into<String>,
        records: Vec<ShapeRecord>,
        candidates: Vec<BoundaryCandidate>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            num_stages: records.len().saturating_sub(1),
            records,
            candidates,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
