//! Boundary manifest and profile report persistence.
//!
//! The manifest is the artifact handed to the split selector and to the
//! production [`crate::executor::SplitExecutor`]: one line per retained
//! boundary, comma-separated shape dims followed by the boundary index.
//!
//! ```text
//! 1,3,224,224,0
//! 1,512,3
//! 1,1000,4
//! ```
//!
//! Files are written to a sibling temp path and renamed into place, so a
//! reader never sees a partial manifest.

use std::fs;
use std::path::{Path, PathBuf};

use edgesplit_types::{BoundaryCandidate, ProfileReport, Shape};

use crate::error::{PipelineError, Result};

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub boundary: usize,
    pub shape: Shape,
}

// ── Text manifest ─────────────────────────────────────────────────────────────

pub fn format_manifest(candidates: &[BoundaryCandidate]) -> String {
    let mut out = String::new();
    for c in candidates {
        for d in c.shape.dims() {
            out.push_str(&d.to_string());
            out.push(',');
        }
        out.push_str(&c.boundary.to_string());
        out.push('\n');
    }
    out
}

pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = line
            .split(',')
            .map(|f| f.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Manifest(format!("line {}: {e}", line_no + 1)))?;

        let Some((&boundary, dims)) = fields.split_last() else {
            continue;
        };
        if dims.is_empty() {
            return Err(PipelineError::Manifest(format!(
                "line {}: expected shape dims before the boundary index",
                line_no + 1
            )));
        }
        if let Some(prev) = entries.last().map(|e: &ManifestEntry| e.boundary) {
            if boundary <= prev {
                return Err(PipelineError::Manifest(format!(
                    "line {}: boundary {boundary} is not after {prev}",
                    line_no + 1
                )));
            }
        }
        entries.push(ManifestEntry {
            boundary,
            shape: Shape::new(dims.to_vec()),
        });
    }
    Ok(entries)
}

pub fn write_manifest(candidates: &[BoundaryCandidate], path: &Path) -> Result<()> {
    write_atomic(path, format_manifest(candidates).as_bytes())
}

pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = fs::read_to_string(path)?;
    parse_manifest(&text)
}

/// Pretty-print candidates as JSON (useful for debugging / inspection).
pub fn manifest_to_json(candidates: &[BoundaryCandidate]) -> Result<String> {
    serde_json::to_string_pretty(candidates)
        .map_err(|e| PipelineError::Serialization(format!("JSON serialization: {e}")))
}

// ── Profile report ────────────────────────────────────────────────────────────

/// Serialize a report to CBOR and write it to `path`.
pub fn write_report(report: &ProfileReport, path: &Path) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    ciborium::ser::into_writer(report, &mut buf)
        .map_err(|e| PipelineError::Serialization(format!("CBOR serialization: {e}")))?;
    write_atomic(path, &buf)
}

/// Read a report from a CBOR file.
pub fn read_report(path: &Path) -> Result<ProfileReport> {
    let data = fs::read(path)?;
    ciborium::de::from_reader(&data[..])
        .map_err(|e| PipelineError::Serialization(format!("CBOR deserialization: {e}")))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp: PathBuf = path.to_path_buf();
    let file_name = path
        .file_name()
        .ok_or_else(|| PipelineError::Manifest(format!("not a file path: {}", path.display())))?;
    tmp.set_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use edgesplit_types::ShapeRecord;

    fn candidates() -> Vec<BoundaryCandidate> {
        vec![
            BoundaryCandidate {
                boundary: 0,
                shape: Shape::new([1, 3, 224, 224]),
                transfer_size: 150_528,
            },
            BoundaryCandidate {
                boundary: 3,
                shape: Shape::new([1, 512]),
                transfer_size: 512,
            },
            BoundaryCandidate {
                boundary: 4,
                shape: Shape::new([1, 1000]),
                transfer_size: 1000,
            },
        ]
    }

    #[test]
    fn text_format_lists_dims_then_boundary() {
        let text = format_manifest(&candidates());
        assert_eq!(text, "1,3,224,224,0\n1,512,3\n1,1000,4\n");
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet.manifest");

        write_manifest(&candidates(), &path).unwrap();
        let entries = read_manifest(&path).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].boundary, 3);
        assert_eq!(entries[1].shape, Shape::new([1, 512]));
        // No temp file left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_manifest("1,abc,3\n").is_err());
        assert!(parse_manifest("7\n").is_err());
        assert!(parse_manifest("1,8,4\n1,4,2\n").is_err());
        assert!(parse_manifest("\n\n").unwrap().is_empty());
    }

    #[test]
    fn json_export() {
        let json = manifest_to_json(&candidates()).unwrap();
        assert!(json.contains("\"boundary\": 3"));
        assert!(json.contains("\"transfer_size\": 150528"));
    }

    #[test]
    fn cbor_report_round_trip() {
        let records = vec![
            ShapeRecord::new(0, Shape::new([1, 3, 224, 224]), 0),
            ShapeRecord::new(1, Shape::new([1, 512]), 40),
        ];
        let report = ProfileReport::new("resnet50", records, candidates());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.cbor");

        write_report(&report, &path).unwrap();
        let loaded = read_report(&path).unwrap();

        assert_eq!(loaded.model_name, "resnet50");
        assert_eq!(loaded.num_stages, 1);
        assert_eq!(loaded.records, report.records);
        assert_eq!(loaded.candidates, report.candidates);
    }
}
