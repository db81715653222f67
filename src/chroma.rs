//! Chroma vectors
//!
//! 12-bin pitch-class energy frames and the symbolic-note equivalent
//! (pitch-class histograms built from timed note events).

use std::ops::Index;

use crate::chord_matcher::ChordError;

/// Number of pitch classes in an octave.
pub const SEMITONES: usize = 12;

/// Energy for each of the 12 pitch classes, index 0 = C.
///
/// Bins are never negative: negative inputs are clamped to zero on
/// construction. The vector is immutable once built.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ChromaVector([f32; SEMITONES]);

/// Time-ordered chroma frames, one per analysis window.
pub type FrameSequence = Vec<ChromaVector>;

impl ChromaVector {
    /// Build a chroma vector from 12 bins.
    pub fn new(mut bins: [f32; SEMITONES]) -> Self {
        for b in bins.iter_mut() {
            if b.is_nan() || *b < 0.0 {
                *b = 0.0;
            }
        }
        ChromaVector(bins)
    }

    /// Build a chroma vector from a slice.
    ///
    /// Returns `Err(ChordError::InvalidLength)` if `bins.len() != 12`.
    pub fn from_slice(bins: &[f32]) -> Result<Self, ChordError> {
        let arr: [f32; SEMITONES] =
            bins.try_into().map_err(|_| ChordError::InvalidLength {
                expected: SEMITONES,
                got: bins.len(),
            })?;
        Ok(Self::new(arr))
    }

    /// The raw bins.
    pub fn bins(&self) -> &[f32; SEMITONES] {
        &self.0
    }

    /// Total pitch-class energy of the frame.
    pub fn energy(&self) -> f32 {
        self.0.iter().sum()
    }

    /// True if every bin is zero.
    pub fn is_silent(&self) -> bool {
        self.0.iter().all(|&b| b == 0.0)
    }

    /// Element-wise mean of a set of frames. `None` for an empty set.
    pub fn mean(frames: &[ChromaVector]) -> Option<ChromaVector> {
        if frames.is_empty() {
            return None;
        }
        let mut acc = [0.0f32; SEMITONES];
        for f in frames {
            for (a, &b) in acc.iter_mut().zip(f.0.iter()) {
                *a += b;
            }
        }
        let n = frames.len() as f32;
        acc.iter_mut().for_each(|a| *a /= n);
        Some(ChromaVector(acc))
    }
}

impl Index<usize> for ChromaVector {
    type Output = f32;

    fn index(&self, idx: usize) -> &f32 {
        &self.0[idx]
    }
}

impl From<[f32; SEMITONES]> for ChromaVector {
    fn from(bins: [f32; SEMITONES]) -> Self {
        ChromaVector::new(bins)
    }
}

/// A timed note from a parsed score or MIDI file.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number (60 = middle C).
    pub pitch: u8,
    /// Onset in seconds.
    pub start: f32,
    /// Length in seconds.
    pub duration: f32,
    /// MIDI velocity, 0..=127.
    pub velocity: u8,
}

impl NoteEvent {
    /// Pitch class of the note, 0 = C.
    pub fn pitch_class(&self) -> usize {
        self.pitch as usize % SEMITONES
    }

    /// Onset plus duration.
    pub fn end(&self) -> f32 {
        self.start + self.duration
    }

    fn weight(&self) -> f32 {
        self.duration.max(0.0) * (self.velocity as f32 / 127.0)
    }
}

/// Duration- and velocity-weighted pitch-class histogram of a set of notes.
pub fn pitch_class_histogram(notes: &[NoteEvent]) -> ChromaVector {
    let mut bins = [0.0f32; SEMITONES];
    for n in notes {
        bins[n.pitch_class()] += n.weight();
    }
    ChromaVector::new(bins)
}

/// Split notes into consecutive segments of `segment_seconds` and build one
/// histogram per segment. A note contributes to every segment it overlaps,
/// weighted by the overlap length.
pub fn segment_histograms(notes: &[NoteEvent], segment_seconds: f32) -> FrameSequence {
    if notes.is_empty() || segment_seconds.is_nan() || segment_seconds <= 0.0 {
        return Vec::new();
    }
    let end = notes.iter().map(NoteEvent::end).fold(0.0f32, f32::max);
    let count = (end / segment_seconds).ceil().max(1.0) as usize;
    let mut frames = vec![[0.0f32; SEMITONES]; count];

    for n in notes {
        let vel = n.velocity as f32 / 127.0;
        let first = (n.start.max(0.0) / segment_seconds) as usize;
        for (seg, bins) in frames.iter_mut().enumerate().skip(first) {
            let seg_start = seg as f32 * segment_seconds;
            let seg_end = seg_start + segment_seconds;
            if seg_start >= n.end() {
                break;
            }
            let overlap = n.end().min(seg_end) - n.start.max(seg_start);
            if overlap > 0.0 {
                bins[n.pitch_class()] += overlap * vel;
            }
        }
    }

    frames.into_iter().map(ChromaVector::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: f32, duration: f32) -> NoteEvent {
        NoteEvent {
            pitch,
            start,
            duration,
            velocity: 127,
        }
    }

    #[test]
    fn negative_bins_are_clamped() {
        let mut bins = [1.0; SEMITONES];
        bins[3] = -2.0;
        bins[4] = f32::NAN;
        let c = ChromaVector::new(bins);
        assert_eq!(c[3], 0.0);
        assert_eq!(c[4], 0.0);
        assert_eq!(c.energy(), 10.0);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = ChromaVector::from_slice(&[0.0; 11]).unwrap_err();
        assert!(matches!(
            err,
            ChordError::InvalidLength {
                expected: 12,
                got: 11
            }
        ));
    }

    #[test]
    fn histogram_folds_octaves() {
        let notes = [note(60, 0.0, 1.0), note(72, 0.0, 1.0), note(67, 0.0, 0.5)];
        let h = pitch_class_histogram(&notes);
        assert_eq!(h[0], 2.0);
        assert_eq!(h[7], 0.5);
        assert_eq!(h[1], 0.0);
    }

    #[test]
    fn segments_split_long_notes() {
        let notes = [note(60, 0.0, 1.5), note(64, 1.0, 1.0)];
        let frames = segment_histograms(&notes, 1.0);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], 1.0);
        assert_eq!(frames[0][4], 0.0);
        assert_eq!(frames[1][0], 0.5);
        assert_eq!(frames[1][4], 1.0);
    }
}
