//! A small deterministic image-classifier-shaped model repository.
//!
//! Real kernels come from an external model repository; this one exists so
//! the profiling path can be exercised end to end without model weights.
//! Weights are derived from indices, so every run is bit-identical.
//!
//! ```text
//! stem  stem_act  pool1  block1[ block1.0[expand, act], block1.1 ]  pool2  │ head_fc1  head_act  head_fc2
//!                                                                  flatten ┘
//! ```

use std::sync::Arc;

use edgesplit_types::config::GraphConfig;
use edgesplit_types::{Shape, Tensor};

use crate::error::{PipelineError, Result};
use crate::graph::PipelineHierarchy;
use crate::stage::{ModelRepository, Stage};

pub const DEMO_INPUT_DIMS: [usize; 4] = [1, 3, 16, 16];

fn weight(row: usize, col: usize) -> f32 {
    ((row * 31 + col * 17) % 13) as f32 / 13.0 - 0.45
}

/// Dims of `input` as a fixed-rank array, or an execution error naming `stage`.
fn dims_of<const R: usize>(stage: &str, input: &Tensor) -> Result<[usize; R]> {
    <[usize; R]>::try_from(input.shape().dims()).map_err(|_| {
        PipelineError::Execution(format!("{stage} expects rank {R}, got shape {}", input.shape()))
    })
}

// ── Kernels ───────────────────────────────────────────────────────────────────

/// 1×1 convolution: mixes channels, keeps spatial dims.
pub struct ChannelMix {
    name: String,
    out_channels: usize,
}

impl Stage for ChannelMix {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let [n, c, h, w] = dims_of::<4>(&self.name, input)?;
        let plane = h * w;
        let src = input.data();
        let out_c = self.out_channels;
        let out = Tensor::from_fn(Shape::new([n, out_c, h, w]), |i| {
            let b = i / (out_c * plane);
            let o = (i / plane) % out_c;
            let p = i % plane;
            (0..c)
                .map(|ci| src[(b * c + ci) * plane + p] * weight(o, ci))
                .sum()
        });
        Ok(out)
    }
}

pub struct Relu {
    name: String,
}

impl Stage for Relu {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let data = input.data().iter().map(|v| v.max(0.0)).collect();
        Ok(Tensor::new(input.shape().clone(), data)?)
    }
}

/// 2×2 average pooling with stride 2.
pub struct AvgPool2 {
    name: String,
}

impl Stage for AvgPool2 {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let [n, c, h, w] = dims_of::<4>(&self.name, input)?;
        let (oh, ow) = (h / 2, w / 2);
        let src = input.data();
        let out = Tensor::from_fn(Shape::new([n, c, oh, ow]), |i| {
            let plane = i / (oh * ow);
            let y = (i / ow) % oh;
            let x = i % ow;
            let base = plane * h * w;
            let at = |yy: usize, xx: usize| src[base + yy * w + xx];
            (at(2 * y, 2 * x) + at(2 * y, 2 * x + 1) + at(2 * y + 1, 2 * x) + at(2 * y + 1, 2 * x + 1))
                / 4.0
        });
        Ok(out)
    }
}

/// Fully connected layer over `[N, in_features]`.
pub struct Dense {
    name: String,
    in_features: usize,
    out_features: usize,
}

impl Stage for Dense {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let [n, f] = dims_of::<2>(&self.name, input)?;
        if f != self.in_features {
            return Err(PipelineError::Execution(format!(
                "{} expects {} features, got {f}",
                self.name, self.in_features
            )));
        }
        let src = input.data();
        let out_f = self.out_features;
        let out = Tensor::from_fn(Shape::new([n, out_f]), |i| {
            let b = i / out_f;
            let o = i % out_f;
            (0..f).map(|j| src[b * f + j] * weight(o, j)).sum::<f32>() / f as f32
        });
        Ok(out)
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DemoRepository;

impl DemoRepository {
    /// Builder configuration for this architecture: flatten before the head.
    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig::flatten_before("head_fc1")
    }

    /// Deterministic representative input.
    pub fn sample_input(&self) -> Tensor {
        Tensor::from_fn(Shape::new(DEMO_INPUT_DIMS), |i| ((i * 7919) % 255) as f32 / 255.0)
    }
}

impl ModelRepository for DemoRepository {
    fn model_name(&self) -> &str {
        "demo-cnn"
    }

    fn pipeline_hierarchy(&self) -> Result<PipelineHierarchy> {
        let mix = |name: &str, out_channels| Arc::new(ChannelMix { name: name.into(), out_channels });
        let relu = |name: &str| Arc::new(Relu { name: name.into() });
        let pool = |name: &str| Arc::new(AvgPool2 { name: name.into() });

        let mut h = PipelineHierarchy::new();
        h.add_atomic("stem", mix("stem", 8))?
            .add_atomic("stem_act", relu("stem_act"))?
            .add_atomic("pool1", pool("pool1"))?
            .add_atomic("block1.0.expand", mix("block1.0.expand", 16))?
            .add_atomic("block1.0.act", relu("block1.0.act"))?
            .add_composite("block1.0", ["block1.0.expand", "block1.0.act"])?
            .add_atomic("block1.1", relu("block1.1"))?
            .add_composite("block1", ["block1.0", "block1.1"])?
            .add_atomic("pool2", pool("pool2"))?
            .add_atomic(
                "head_fc1",
                Arc::new(Dense { name: "head_fc1".into(), in_features: 256, out_features: 64 }),
            )?
            .add_atomic("head_act", relu("head_act"))?
            .add_atomic(
                "head_fc2",
                Arc::new(Dense { name: "head_fc2".into(), in_features: 64, out_features: 10 }),
            )?;

        for root in ["stem", "stem_act", "pool1", "block1", "pool2", "head_fc1", "head_act", "head_fc2"] {
            h.push_root(root);
        }
        Ok(h)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::full_run;
    use crate::graph::build_sequence;

    #[test]
    fn demo_flattens_to_ten_stages() {
        let repo = DemoRepository;
        let seq = build_sequence(&repo.pipeline_hierarchy().unwrap(), &repo.graph_config()).unwrap();
        assert_eq!(
            seq.names(),
            vec![
                "stem", "stem_act", "pool1", "block1.0", "block1.1", "pool2", "flatten",
                "head_fc1", "head_act", "head_fc2",
            ]
        );
    }

    #[test]
    fn demo_produces_ten_logits() {
        let repo = DemoRepository;
        let seq = build_sequence(&repo.pipeline_hierarchy().unwrap(), &repo.graph_config()).unwrap();
        let out = full_run(&seq, &repo.sample_input()).unwrap();
        assert_eq!(out.shape(), &Shape::new([1, 10]));
        assert!(out.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn dense_rejects_unflattened_input() {
        let repo = DemoRepository;
        let seq = build_sequence(&repo.pipeline_hierarchy().unwrap(), &GraphConfig::default()).unwrap();
        let err = full_run(&seq, &repo.sample_input()).unwrap_err();
        assert!(err.to_string().contains("head_fc1"));
    }

    #[test]
    fn pooling_averages_windows() {
        let pool = AvgPool2 { name: "p".into() };
        let t = Tensor::new(Shape::new([1, 1, 2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = pool.apply(&t).unwrap();
        assert_eq!(out.shape(), &Shape::new([1, 1, 1, 1]));
        assert_eq!(out.data(), &[2.5]);
    }
}
