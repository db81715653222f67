//! Chord Matcher
//!
//! Scores a chroma frame against every template in the bank and picks the
//! label whose pitch classes hold the most energy.

use std::sync::Arc;

use thiserror::Error;

use crate::chord_template::{
    ChordKind, ChordLabel, ChordTemplate, NoteName, TemplateBank, NUM_CHORDS,
};
use crate::chroma::{ChromaVector, SEMITONES};

/// A label with its template score.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScoredChord {
    /// The matched chord.
    pub label: ChordLabel,
    /// Chroma energy on the chord's pitch classes; higher is better.
    pub score: f32,
}

/// Errors when matching chords
#[derive(Debug, Error)]
pub enum ChordError {
    /// The chromagram provided did not have the expected number of semitones.
    #[error("expected a {expected}-bin chromagram, got {got}")]
    InvalidLength {
        /// The expected number of semitones (12).
        expected: usize,
        /// The actual number of semitones provided.
        got: usize,
    },

    /// An invalid argument was provided to a matching function.
    #[error("invalid argument `{arg}`: {msg}")]
    InvalidArgument {
        /// The name of the invalid argument.
        arg: &'static str,
        /// A description of the invalid argument.
        msg: String,
    },
}

/// Template-correlation chord matcher.
///
/// Cheap to clone: the template bank is shared behind an `Arc` and never
/// mutated, so one matcher can be handed to several threads.
#[derive(Debug, Clone, Default)]
pub struct ChordMatcher {
    bank: Arc<TemplateBank>,
}

impl ChordMatcher {
    /// Create a matcher over a freshly built bank.
    pub fn new() -> Self {
        Self::with_bank(Arc::new(TemplateBank::new()))
    }

    /// Create a matcher sharing an existing bank.
    pub fn with_bank(bank: Arc<TemplateBank>) -> Self {
        ChordMatcher { bank }
    }

    /// The template bank this matcher scores against.
    pub fn bank(&self) -> &TemplateBank {
        &self.bank
    }

    /// Best matching label for a chroma frame.
    ///
    /// Ties go to the template that comes first in bank order. An all-zero
    /// frame scores 0 everywhere and therefore returns "C" (the first
    /// template); this is a boundary, not an error.
    pub fn match_chroma(&self, chroma: &ChromaVector) -> ChordLabel {
        let mut best = FIRST_LABEL;
        let mut best_score = f32::NEG_INFINITY;
        for t in self.bank.iter() {
            let s = score_chord(chroma, t);
            if s > best_score {
                best_score = s;
                best = t.label;
            }
        }
        best
    }

    /// Detect the single best chord from a chromagram slice.
    ///
    /// Returns `Err(ChordError::InvalidLength)` if `chroma.len() != 12`.
    pub fn match_slice(&self, chroma: &[f32]) -> Result<ChordLabel, ChordError> {
        let chroma = ChromaVector::from_slice(chroma)?;
        Ok(self.match_chroma(&chroma))
    }

    /// Match every frame of a sequence, in order.
    pub fn match_frames(&self, frames: &[ChromaVector]) -> Vec<ChordLabel> {
        frames.iter().map(|f| self.match_chroma(f)).collect()
    }

    /// The top `k` chords, best first. Equal scores keep bank order.
    ///
    /// Returns `Err(InvalidArgument)` if `k == 0`.
    pub fn top_k(&self, chroma: &ChromaVector, k: usize) -> Result<Vec<ScoredChord>, ChordError> {
        if k == 0 {
            return Err(ChordError::InvalidArgument {
                arg: "k",
                msg: "must be >= 1".to_string(),
            });
        }
        let mut scored: Vec<ScoredChord> = self
            .bank
            .iter()
            .map(|t| ScoredChord {
                label: t.label,
                score: score_chord(chroma, t),
            })
            .collect();
        // stable sort keeps bank order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k.min(NUM_CHORDS));
        Ok(scored)
    }
}

const FIRST_LABEL: ChordLabel = ChordLabel::new(NoteName::C, ChordKind::Major);

/// Dot product of the chroma frame with a template mask
#[inline(always)]
fn score_chord(chroma: &ChromaVector, t: &ChordTemplate) -> f32 {
    let mut acc = 0.0;
    (0..SEMITONES).for_each(|i| {
        acc += chroma[i] * t.mask[i] as f32;
    });
    acc
}
