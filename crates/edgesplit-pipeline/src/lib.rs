//! `edgesplit-pipeline`: split-point discovery for edge/cloud inference.
//!
//! This crate is a **coordination layer**, not a compute layer. Stage kernels
//! come from an external model repository; this crate flattens the model into
//! an ordered stage sequence, runs it split at every boundary to learn the
//! tensor shape crossing each cut, and reduces those boundaries to the few
//! worth offering to a split selector.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  hierarchy   │──▶│    graph     │──▶│   profiler   │──▶│   reducer    │──▶ manifest
//! │ (repository) │   │ (flatten)    │   │ prefix+suffix│   │ (candidates) │
//! └──────────────┘   └──────────────┘   └──────┬───────┘   └──────────────┘
//!                                              │ uses
//!                                        ┌─────▼──────┐
//!                                        │  executor  │◀── production client/server
//!                                        └────────────┘
//! ```

pub mod demo;
pub mod error;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod profiler;
pub mod reducer;
pub mod stage;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use error::{PipelineError, Result};
pub use executor::{full_run, prefix_run, suffix_run, SplitExecutor};
pub use graph::{build_sequence, HierarchyNode, PipelineHierarchy};
pub use manifest::{read_manifest, write_manifest, ManifestEntry};
pub use profiler::profile_shapes;
pub use reducer::reduce_candidates;
pub use stage::{ModelRepository, ReshapeStage, SequentialStage, Stage, StageRef, StageSequence};

use std::path::Path;

use edgesplit_types::config::{GraphConfig, ProfilerConfig};
use edgesplit_types::{ProfileReport, Tensor};
use tracing::info;

/// Flatten, profile, and reduce one model.
///
/// Fails without producing a report if the hierarchy is malformed or any
/// boundary fails the decomposition check.
pub fn profile_model(
    repository: &dyn ModelRepository,
    graph: &GraphConfig,
    profiler: &ProfilerConfig,
    input: &Tensor,
) -> Result<ProfileReport> {
    let hierarchy = repository.pipeline_hierarchy()?;
    let sequence = build_sequence(&hierarchy, graph)?;
    let records = profile_shapes(&sequence, input, profiler)?;
    let candidates = reduce_candidates(&records);

    info!(
        model = repository.model_name(),
        stages = sequence.len(),
        candidates = candidates.len(),
        "model profiled"
    );

    Ok(ProfileReport::new(repository.model_name(), records, candidates))
}

/// Persist the text manifest and the CBOR report of a finished profile.
pub fn persist_profile(report: &ProfileReport, manifest_path: &Path, report_path: &Path) -> Result<()> {
    manifest::write_manifest(&report.candidates, manifest_path)?;
    info!(path = %manifest_path.display(), "manifest written");
    manifest::write_report(report, report_path)?;
    info!(path = %report_path.display(), "profile report written");
    Ok(())
}
