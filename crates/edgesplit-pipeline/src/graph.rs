//! Stage graph builder: hierarchical pipeline description → flat sequence.
//!
//! Algorithm:
//! 1. Walk the top-level node ids in order.
//! 2. Atomic nodes are kept as-is.
//! 3. Composite nodes are expanded exactly one level; each child becomes a
//!    top-level stage. A child that is itself composite stays whole and runs
//!    its descendants sequentially.
//! 4. If configured, a reshape stage is inserted immediately before the
//!    `flatten_before` node.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use edgesplit_types::config::GraphConfig;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::stage::{ReshapeStage, SequentialStage, StageRef, StageSequence};

// ── Hierarchy ─────────────────────────────────────────────────────────────────

pub enum HierarchyNode {
    Atomic(StageRef),
    /// Ordered child node ids.
    Composite(Vec<String>),
}

impl fmt::Debug for HierarchyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic(stage) => f.debug_tuple("Atomic").field(&stage.name()).finish(),
            Self::Composite(children) => f.debug_tuple("Composite").field(children).finish(),
        }
    }
}

/// Pipeline description as handed over by the model repository.
///
/// Nodes reference each other by id, so malformed input (dangling ids,
/// cycles) is representable and rejected at build time.
#[derive(Debug, Default)]
pub struct PipelineHierarchy {
    roots: Vec<String>,
    nodes: HashMap<String, HierarchyNode>,
}

impl PipelineHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atomic(&mut self, id: impl Into<String>, stage: StageRef) -> Result<&mut Self> {
        self.insert(id.into(), HierarchyNode::Atomic(stage))
    }

    pub fn add_composite<I, S>(&mut self, id: impl Into<String>, children: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.insert(id.into(), HierarchyNode::Composite(children))
    }

    /// Append a top-level node id. Order of calls is execution order.
    pub fn push_root(&mut self, id: impl Into<String>) -> &mut Self {
        self.roots.push(id.into());
        self
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn node(&self, id: &str) -> Option<&HierarchyNode> {
        self.nodes.get(id)
    }

    fn insert(&mut self, id: String, node: HierarchyNode) -> Result<&mut Self> {
        if self.nodes.contains_key(&id) {
            return Err(PipelineError::Structural(format!("duplicate node id '{id}'")));
        }
        self.nodes.insert(id, node);
        Ok(self)
    }

    fn lookup(&self, id: &str) -> Result<&HierarchyNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| PipelineError::Structural(format!("unknown node id '{id}'")))
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Flatten `hierarchy` into a [`StageSequence`] in model execution order.
pub fn build_sequence(hierarchy: &PipelineHierarchy, config: &GraphConfig) -> Result<StageSequence> {
    if hierarchy.roots.is_empty() {
        return Err(PipelineError::Structural("pipeline hierarchy has no top-level nodes".into()));
    }

    let mut seen_roots = HashSet::new();
    let mut flat: Vec<(String, StageRef)> = Vec::new();

    for root in &hierarchy.roots {
        if !seen_roots.insert(root.as_str()) {
            return Err(PipelineError::Structural(format!(
                "top-level node '{root}' listed more than once"
            )));
        }

        match hierarchy.lookup(root)? {
            HierarchyNode::Atomic(stage) => flat.push((root.clone(), Arc::clone(stage))),
            HierarchyNode::Composite(children) => {
                if children.is_empty() {
                    return Err(PipelineError::Structural(format!("composite '{root}' is empty")));
                }
                debug!(composite = %root, children = children.len(), "expanding composite");
                let mut path = vec![root.clone()];
                for child in children {
                    let stage = materialize(hierarchy, child, &mut path)?;
                    flat.push((child.clone(), stage));
                }
            }
        }
    }

    if let Some(target) = &config.flatten_before {
        let pos = flat.iter().position(|(id, _)| id == target).ok_or_else(|| {
            PipelineError::Structural(format!(
                "flatten_before node '{target}' is not a stage of the flattened pipeline"
            ))
        })?;
        flat.insert(pos, ("flatten".to_string(), Arc::new(ReshapeStage)));
        debug!(before = %target, index = pos, "inserted reshape stage");
    }

    info!(stages = flat.len(), "flattened pipeline hierarchy");

    Ok(StageSequence::new(flat.into_iter().map(|(_, s)| s).collect()))
}

/// Turn a node into one executable stage. `path` holds the ancestors of `id`
/// and is used to reject cycles.
fn materialize(hierarchy: &PipelineHierarchy, id: &str, path: &mut Vec<String>) -> Result<StageRef> {
    if path.iter().any(|p| p == id) {
        return Err(PipelineError::Structural(format!(
            "cycle detected: {} -> {id}",
            path.join(" -> ")
        )));
    }

    match hierarchy.lookup(id)? {
        HierarchyNode::Atomic(stage) => Ok(Arc::clone(stage)),
        HierarchyNode::Composite(children) => {
            if children.is_empty() {
                return Err(PipelineError::Structural(format!("composite '{id}' is empty")));
            }
            path.push(id.to_string());
            let stages = children
                .iter()
                .map(|child| materialize(hierarchy, child, path))
                .collect::<Result<Vec<_>>>()?;
            path.pop();
            Ok(Arc::new(SequentialStage::new(id, stages)))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use edgesplit_types::{Shape, Tensor};

    struct Named(&'static str);

    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, input: &Tensor) -> Result<Tensor> {
            Ok(input.clone())
        }
    }

    fn atomic(h: &mut PipelineHierarchy, id: &'static str) {
        h.add_atomic(id, Arc::new(Named(id))).unwrap();
    }

    /// stem, layer1 = [b0 = [conv, act], b1], fc
    fn block_hierarchy() -> PipelineHierarchy {
        let mut h = PipelineHierarchy::new();
        atomic(&mut h, "stem");
        atomic(&mut h, "conv");
        atomic(&mut h, "act");
        atomic(&mut h, "b1");
        atomic(&mut h, "fc");
        h.add_composite("b0", ["conv", "act"]).unwrap();
        h.add_composite("layer1", ["b0", "b1"]).unwrap();
        h.push_root("stem").push_root("layer1").push_root("fc");
        h
    }

    #[test]
    fn expands_top_level_composite_one_level() {
        let seq = build_sequence(&block_hierarchy(), &GraphConfig::default()).unwrap();
        assert_eq!(seq.names(), vec!["stem", "b0", "b1", "fc"]);
    }

    #[test]
    fn inserts_reshape_before_configured_stage() {
        let seq = build_sequence(&block_hierarchy(), &GraphConfig::flatten_before("fc")).unwrap();
        assert_eq!(seq.names(), vec!["stem", "b0", "b1", "flatten", "fc"]);
    }

    #[test]
    fn flatten_target_may_be_expanded_child() {
        let seq = build_sequence(&block_hierarchy(), &GraphConfig::flatten_before("b1")).unwrap();
        assert_eq!(seq.names(), vec!["stem", "b0", "flatten", "b1", "fc"]);
    }

    #[test]
    fn unknown_flatten_target_is_structural() {
        // "conv" only exists inside the b0 block, not as a flattened stage.
        let err = build_sequence(&block_hierarchy(), &GraphConfig::flatten_before("conv")).unwrap_err();
        assert!(matches!(err, PipelineError::Structural(_)));
    }

    #[test]
    fn nested_composite_runs_as_one_stage() {
        let seq = build_sequence(&block_hierarchy(), &GraphConfig::default()).unwrap();
        let b0 = seq.stage(1).unwrap();
        let t = Tensor::zeros(Shape::new([1, 4]));
        assert_eq!(b0.apply(&t).unwrap(), t);
    }

    #[test]
    fn dangling_reference_is_structural() {
        let mut h = PipelineHierarchy::new();
        h.add_composite("layer", ["missing"]).unwrap();
        h.push_root("layer");
        let err = build_sequence(&h, &GraphConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Structural(_)));
    }

    #[test]
    fn cycle_is_structural() {
        let mut h = PipelineHierarchy::new();
        h.add_composite("a", ["b"]).unwrap();
        h.add_composite("b", ["c"]).unwrap();
        h.add_composite("c", ["a"]).unwrap();
        h.push_root("a");
        let err = build_sequence(&h, &GraphConfig::default()).unwrap_err();
        match err {
            PipelineError::Structural(msg) => assert!(msg.contains("cycle")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_reference_is_structural() {
        let mut h = PipelineHierarchy::new();
        h.add_composite("a", ["a"]).unwrap();
        h.push_root("a");
        assert!(build_sequence(&h, &GraphConfig::default()).is_err());
    }

    #[test]
    fn empty_and_duplicate_inputs_are_structural() {
        let h = PipelineHierarchy::new();
        assert!(build_sequence(&h, &GraphConfig::default()).is_err());

        let mut h = PipelineHierarchy::new();
        atomic(&mut h, "x");
        assert!(h.add_atomic("x", Arc::new(Named("x"))).is_err());

        h.push_root("x").push_root("x");
        assert!(build_sequence(&h, &GraphConfig::default()).is_err());

        let mut h = PipelineHierarchy::new();
        h.add_composite("empty", Vec::<String>::new()).unwrap();
        h.push_root("empty");
        assert!(build_sequence(&h, &GraphConfig::default()).is_err());
    }
}
