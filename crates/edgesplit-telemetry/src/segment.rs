//! Named shared telemetry segments backed by `memmap2`.
//!
//! A segment is a small fixed-size file under a shared-memory directory
//! (`/dev/shm` by default) named after a stable integer key:
//! `<shm_dir>/edgesplit-<key>`. Any process that knows the key can map it.
//!
//! Attach/detach is scoped: every read or write maps the file, copies, and
//! drops the mapping before returning, on every exit path. There is no lock;
//! writes are one bounded copy and readers tolerate a torn value.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::{Result, TelemetryError};

/// Width of the owned bandwidth value: zero-padded decimal digits.
pub const FIXED_WIDTH_DIGITS: usize = 10;

/// Largest value representable in [`FIXED_WIDTH_DIGITS`] digits.
pub const FIXED_WIDTH_MAX: u64 = 9_999_999_999;

/// Path on disk for a given key.
pub fn segment_path(shm_dir: &Path, key: u32) -> PathBuf {
    shm_dir.join(format!("edgesplit-{key}"))
}

// ── Segment ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SharedSegment {
    key: u32,
    path: PathBuf,
}

impl SharedSegment {
    /// Create (or reuse) an owned segment of at least `size` bytes.
    pub fn create(shm_dir: &Path, key: u32, size: usize) -> Result<Self> {
        let path = segment_path(shm_dir, key);
        let seg_err = |source| TelemetryError::Segment { key, path: path.clone(), source };

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }
        let file = options.open(&path).map_err(seg_err)?;

        let current = file.metadata().map_err(seg_err)?.len();
        if current < size as u64 {
            file.set_len(size as u64).map_err(seg_err)?;
        }

        Ok(Self { key, path })
    }

    /// Open a segment created by another process. It must already exist.
    pub fn open(shm_dir: &Path, key: u32) -> Result<Self> {
        let path = segment_path(shm_dir, key);
        File::open(&path).map_err(|source| TelemetryError::Segment {
            key,
            path: path.clone(),
            source,
        })?;
        Ok(Self { key, path })
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the whole segment out.
    pub fn read(&self) -> Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the mapping is read-only and lives only for this call; a
        // concurrent writer can at worst produce a torn value, which callers
        // tolerate.
        let mapped = unsafe { Mmap::map(&file)? };
        Ok(mapped.to_vec())
    }

    /// Overwrite the start of the segment with `bytes` in one copy.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        // SAFETY: the segment is only written by its owning process, and the
        // mapping is dropped before this function returns.
        let mut mapped = unsafe { MmapMut::map_mut(&file)? };
        if mapped.len() < bytes.len() {
            return Err(TelemetryError::SegmentTooSmall {
                key: self.key,
                actual: mapped.len(),
                required: bytes.len(),
            });
        }
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

// ── Fixed-width codec ─────────────────────────────────────────────────────────

/// Encode `value` as a zero-padded 10-digit decimal. Values above
/// [`FIXED_WIDTH_MAX`] saturate.
pub fn encode_fixed_width(value: u64) -> String {
    format!("{:0width$}", value.min(FIXED_WIDTH_MAX), width = FIXED_WIDTH_DIGITS)
}

/// Decode the leading fixed-width decimal of a segment.
pub fn decode_fixed_width(bytes: &[u8]) -> Result<u64> {
    let digits = bytes
        .get(..FIXED_WIDTH_DIGITS)
        .ok_or_else(|| TelemetryError::Decode(format!("segment holds only {} bytes", bytes.len())))?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(TelemetryError::Decode(format!(
            "not a {FIXED_WIDTH_DIGITS}-digit decimal: {:?}",
            String::from_utf8_lossy(digits)
        )));
    }
    let text = std::str::from_utf8(digits).map_err(|e| TelemetryError::Decode(e.to_string()))?;
    text.parse::<u64>().map_err(|e| TelemetryError::Decode(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
