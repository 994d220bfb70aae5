//! Identity resolution against a gallery of known face encodings.
//!
//! Encodings are produced by an external vision pipeline. This module only
//! decides which known identity, if any, a probe encoding belongs to.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default acceptance threshold in normalized Euclidean distance space.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed gallery {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("gallery entry for {identity} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
}

/// Face encoding vector (128-dimensional for the usual dlib-style encoders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two encodings. Lower = more similar.
    ///
    /// Encodings of different length are never similar.
    pub fn distance(&self, other: &Encoding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One stored encoding for a known identity. An identity may own several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub identity: String,
    pub encoding: Encoding,
}

/// Read a JSON gallery (`[{"identity": "...", "encoding": [..]}, ..]`).
///
/// A missing file yields an empty gallery: every probe then resolves to unknown.
pub fn load_gallery(path: &Path) -> Result<Vec<GalleryEntry>, GalleryError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "gallery not found; every face will resolve to unknown");
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| GalleryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let gallery: Vec<GalleryEntry> =
        serde_json::from_str(&raw).map_err(|source| GalleryError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    if let Some(first) = gallery.first() {
        let expected = first.encoding.values.len();
        if let Some(bad) = gallery
            .iter()
            .find(|e| e.encoding.values.len() != expected)
        {
            return Err(GalleryError::DimensionMismatch {
                identity: bad.identity.clone(),
                expected,
                actual: bad.encoding.values.len(),
            });
        }
    }

    tracing::info!(path = %path.display(), entries = gallery.len(), "gallery loaded");
    Ok(gallery)
}

/// Per-face resolution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Resolved identity; `None` means unknown.
    pub identity: Option<String>,
    /// Dissimilarity of the closest candidate.
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            identity: None,
            distance,
        }
    }

    /// Accept `candidate` only if `distance` is strictly below `threshold`.
    ///
    /// The closest candidate is discarded when it does not clear the bar.
    pub fn from_candidate(candidate: Option<&str>, distance: f32, threshold: f32) -> Self {
        match candidate {
            Some(identity) if distance < threshold => Self {
                identity: Some(identity.to_string()),
                distance,
            },
            _ => Self::unknown(distance),
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for resolving a probe encoding to a known identity.
pub trait Resolver {
    fn resolve(&self, probe: &Encoding) -> MatchResult;
}

/// Nearest-neighbour matcher with an absolute distance threshold.
pub struct DistanceMatcher {
    gallery: Vec<GalleryEntry>,
    threshold: f32,
}

impl DistanceMatcher {
    pub fn new(gallery: Vec<GalleryEntry>, threshold: f32) -> Self {
        Self { gallery, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.gallery.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gallery.is_empty()
    }
}

impl Resolver for DistanceMatcher {
    fn resolve(&self, probe: &Encoding) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in self.gallery.iter().enumerate() {
            let dist = probe.distance(&entry.encoding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let candidate = best_idx.map(|idx| self.gallery[idx].identity.as_str());
        MatchResult::from_candidate(candidate, best_dist, self.threshold)
    }
}
