//! Key Estimator
//!
//! Picks the strongest pitch class over a whole piece as the tonic, then
//! decides major vs. minor by correlating the energy profile with the two
//! scale masks rotated to that tonic.

use std::fmt::Display;

use crate::chord_template::{rotate, Mask, NoteName};
use crate::chroma::{ChromaVector, SEMITONES};
use crate::outcome::Outcome;

const MAJOR_SCALE: Mask = [1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 0, 1];
const MINOR_SCALE: Mask = [1, 0, 1, 1, 0, 1, 0, 1, 1, 0, 1, 0];

/// Major or natural minor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Major (Ionian).
    Major,
    /// Natural minor (Aeolian).
    Minor,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Major => f.write_str("major"),
            Mode::Minor => f.write_str("minor"),
        }
    }
}

/// Estimated tonal center of a piece.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct KeyEstimate {
    /// Tonic pitch class.
    pub root: NoteName,
    /// Scale mode.
    pub mode: Mode,
}

impl KeyEstimate {
    /// C major, the fallback key.
    pub const C_MAJOR: KeyEstimate = KeyEstimate {
        root: NoteName::C,
        mode: Mode::Major,
    };
}

impl Display for KeyEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.root, self.mode)
    }
}

/// Whole-piece key estimator.
#[derive(Debug, Copy, Clone, Default)]
pub struct KeyEstimator;

impl KeyEstimator {
    /// Create an estimator.
    pub fn new() -> Self {
        KeyEstimator
    }

    /// Estimate the key of a frame sequence.
    ///
    /// Degraded outcomes:
    /// - no frames: C major
    /// - flat energy profile (including silence): the first strongest pitch
    ///   class with mode major, since correlation is undefined
    pub fn estimate(&self, frames: &[ChromaVector]) -> Outcome<KeyEstimate> {
        if frames.is_empty() {
            return Outcome::degraded(KeyEstimate::C_MAJOR, "no chroma frames to analyze");
        }

        let mut profile = [0.0f32; SEMITONES];
        for frame in frames {
            for (p, &b) in profile.iter_mut().zip(frame.bins().iter()) {
                *p += b;
            }
        }
        self.estimate_profile(&profile)
    }

    /// Estimate the key from an already-summed 12-bin energy profile.
    pub fn estimate_profile(&self, profile: &[f32; SEMITONES]) -> Outcome<KeyEstimate> {
        let root_idx = argmax(profile);
        let root = NoteName::from_idx(root_idx);

        let major = correlation(profile, &rotate(&MAJOR_SCALE, root_idx));
        let minor = correlation(profile, &rotate(&MINOR_SCALE, root_idx));

        let (Some(major), Some(minor)) = (major, minor) else {
            return Outcome::degraded(
                KeyEstimate {
                    root,
                    mode: Mode::Major,
                },
                "flat energy profile, mode undefined",
            );
        };

        log::debug!(
            "Key candidate {}: major r={:.3}, minor r={:.3}",
            root,
            major,
            minor
        );

        // ties favour major
        let mode = if major >= minor { Mode::Major } else { Mode::Minor };
        Outcome::Detected(KeyEstimate { root, mode })
    }
}

/// Index of the first maximum.
fn argmax(values: &[f32; SEMITONES]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Pearson correlation of a profile with a binary mask. `None` when either
/// side has zero variance.
fn correlation(profile: &[f32; SEMITONES], mask: &Mask) -> Option<f32> {
    let n = SEMITONES as f64;
    let mean_x = profile.iter().map(|&x| x as f64).sum::<f64>() / n;
    let mean_y = mask.iter().map(|&y| y as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in profile.iter().zip(mask.iter()) {
        let dx = x as f64 - mean_x;
        let dy = y as f64 - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((cov / denom) as f32)
}
