use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::face::Vector;
use crate::gallery::Gallery;
use crate::{Error, Result};

/// How a probe is resolved when several identities clear the threshold.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Accept the first identity, in gallery order, whose best exemplar is
    /// under the threshold.
    #[default]
    FirstAcceptable,
    /// Accept the identity with the globally smallest distance. Ties keep
    /// the earlier identity.
    Best,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    Matched { identity: String, distance: f32 },
    Unmatched,
}

impl Match {
    pub fn identity(&self) -> Option<&str> {
        match self {
            Match::Matched { identity, .. } => Some(identity),
            Match::Unmatched => None,
        }
    }
}

/// Euclidean distance between two embeddings of the same length.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let diff = &ArrayView1::from(a) - &ArrayView1::from(b);
    Ok(diff.dot(&diff).sqrt())
}

/// Distance from `probe` to the closest of `exemplars`.
pub fn best_distance(exemplars: &[Vector], probe: &[f32]) -> Result<Option<f32>> {
    let mut best: Option<f32> = None;
    for exemplar in exemplars {
        let d = distance(exemplar, probe)?;
        if best.map_or(true, |b| d < b) {
            best = Some(d);
        }
    }
    Ok(best)
}

/// Accept `threshold` only if it is finite and non-negative.
pub fn check_threshold(threshold: f32) -> Result<f32> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(threshold)
    } else {
        Err(Error::InvalidThreshold(threshold))
    }
}

/// Nearest-identity classification under a distance threshold.
///
/// A distance equal to the threshold does not match, and neither does a
/// NaN distance or threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    pub threshold: f32,
    pub policy: MatchPolicy,
}

impl Matcher {
    pub fn new(threshold: f32, policy: MatchPolicy) -> Self {
        Self { threshold, policy }
    }

    /// Classify one face embedding.
    pub fn classify_one(&self, probe: &[f32], gallery: &Gallery) -> Result<Match> {
        self.classify(std::slice::from_ref(&probe), gallery)
    }

    /// Classify an image from all of its face embeddings.
    ///
    /// Faces are tried in order; with [`MatchPolicy::FirstAcceptable`] the
    /// first face that matches any identity decides the outcome. No faces
    /// means [`Match::Unmatched`].
    pub fn classify<P: AsRef<[f32]>>(&self, probes: &[P], gallery: &Gallery) -> Result<Match> {
        let mut best: Option<(&str, f32)> = None;

        for probe in probes {
            for (identity, exemplars) in gallery.iter() {
                let Some(d) = best_distance(exemplars, probe.as_ref())? else {
                    continue;
                };
                // written so that NaN never passes
                if !(d < self.threshold) {
                    continue;
                }
                match self.policy {
                    MatchPolicy::FirstAcceptable => {
                        return Ok(Match::Matched {
                            identity: identity.to_string(),
                            distance: d,
                        });
                    }
                    MatchPolicy::Best => {
                        if best.map_or(true, |(_, b)| d < b) {
                            best = Some((identity, d));
                        }
                    }
                }
            }
        }

        Ok(match best {
            Some((identity, distance)) => Match::Matched {
                identity: identity.to_string(),
                distance,
            },
            None => Match::Unmatched,
        })
    }
}
