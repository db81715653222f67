//! Harmony Analyzer
//!
//! The chord/key query API: whole-piece progressions, live-buffer chords,
//! keys and loudness curves from audio sources or symbolic notes.
//!
//! Queries never fail. Unreadable or degenerate input yields a fixed
//! default tagged [`Outcome::Degraded`].

use std::sync::Arc;

use crate::chord_matcher::ChordMatcher;
use crate::chord_template::{ChordKind, ChordLabel, NoteName};
use crate::chroma::{pitch_class_histogram, segment_histograms, ChromaVector, NoteEvent};
use crate::chromagram::FeatureError;
use crate::frontend::{AudioFrontend, AudioSource, DecodedAudio, SpectralFrontend};
use crate::intensity::IntensityTracker;
use crate::key_estimator::{KeyEstimate, KeyEstimator};
use crate::outcome::Outcome;
use crate::smoother::{Progression, ProgressionSmoother, SmoothingMode, DEFAULT_WINDOW};

/// Progression returned when a source cannot be analyzed: C G Am F.
pub const DEFAULT_PROGRESSION: [ChordLabel; 4] = [
    ChordLabel::new(NoteName::C, ChordKind::Major),
    ChordLabel::new(NoteName::G, ChordKind::Major),
    ChordLabel::new(NoteName::A, ChordKind::Minor),
    ChordLabel::new(NoteName::F, ChordKind::Major),
];

/// Chord returned when a live buffer cannot be analyzed.
pub const DEFAULT_CHORD: ChordLabel = ChordLabel::new(NoteName::C, ChordKind::Major);

/// Intensity returned when a source cannot be analyzed.
pub const DEFAULT_INTENSITY: f32 = 0.5;

/// Builder for a [`HarmonyAnalyzer`].
#[derive(Debug, Clone)]
pub struct HarmonyAnalyzerBuilder {
    frame_length: f32,
    smoothing_window: usize,
    smoothing_mode: SmoothingMode,
    intensity_frame_length: f32,
    frontend: Arc<dyn AudioFrontend>,
}

impl HarmonyAnalyzerBuilder {
    /// Start with default parameters:
    /// frame_length = 0.5 s, smoothing_window = 5,
    /// smoothing_mode = DistinctLabels, intensity_frame_length = 1.0 s,
    /// frontend = [`SpectralFrontend`].
    pub fn new() -> Self {
        HarmonyAnalyzerBuilder {
            frame_length: 0.5,
            smoothing_window: DEFAULT_WINDOW,
            smoothing_mode: SmoothingMode::default(),
            intensity_frame_length: 1.0,
            frontend: Arc::new(SpectralFrontend),
        }
    }

    /// Default chord-analysis frame length in seconds.
    pub fn frame_length(mut self, seconds: f32) -> Self {
        self.frame_length = seconds;
        self
    }

    /// Smoothing window in frames.
    pub fn smoothing_window(mut self, frames: usize) -> Self {
        self.smoothing_window = frames;
        self
    }

    /// What the smoother returns.
    pub fn smoothing_mode(mut self, mode: SmoothingMode) -> Self {
        self.smoothing_mode = mode;
        self
    }

    /// Default intensity frame length in seconds.
    pub fn intensity_frame_length(mut self, seconds: f32) -> Self {
        self.intensity_frame_length = seconds;
        self
    }

    /// Decoder and feature extractor to use.
    pub fn frontend(mut self, frontend: Arc<dyn AudioFrontend>) -> Self {
        self.frontend = frontend;
        self
    }

    /// Build the analyzer.
    pub fn build(self) -> HarmonyAnalyzer {
        HarmonyAnalyzer {
            matcher: ChordMatcher::new(),
            smoother: ProgressionSmoother::new(self.smoothing_window, self.smoothing_mode),
            key_estimator: KeyEstimator::new(),
            frame_length: self.frame_length,
            intensity_frame_length: self.intensity_frame_length,
            frontend: self.frontend,
        }
    }
}

impl Default for HarmonyAnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chord, key and intensity estimation over audio and symbolic input.
#[derive(Debug, Clone)]
pub struct HarmonyAnalyzer {
    matcher: ChordMatcher,
    smoother: ProgressionSmoother,
    key_estimator: KeyEstimator,
    frame_length: f32,
    intensity_frame_length: f32,
    frontend: Arc<dyn AudioFrontend>,
}

impl HarmonyAnalyzer {
    /// Return a builder to customize the analyzer.
    pub fn builder() -> HarmonyAnalyzerBuilder {
        HarmonyAnalyzerBuilder::new()
    }

    /// Analyzer with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// The chord matcher.
    pub fn matcher(&self) -> &ChordMatcher {
        &self.matcher
    }

    /// The progression smoother.
    pub fn smoother(&self) -> &ProgressionSmoother {
        &self.smoother
    }

    /// Chord progression of a whole source, using the configured frame
    /// length.
    pub fn progression(&self, source: &AudioSource) -> Outcome<Progression> {
        self.match_harmony(source, self.frame_length)
    }

    /// Chord progression of a whole source with `frame_length`-second
    /// frames at 50% overlap.
    pub fn match_harmony(&self, source: &AudioSource, frame_length: f32) -> Outcome<Progression> {
        let result = self.frontend.decode(source).and_then(|audio| {
            let frames = self.frontend.chroma_frames(&audio, frame_length)?;
            let silent = frames.iter().all(ChromaVector::is_silent);
            Ok((silent, self.matcher.match_frames(&frames)))
        });
        match result {
            Ok((true, _)) => Outcome::degraded(DEFAULT_PROGRESSION.to_vec(), "source is silent"),
            Ok((false, labels)) => Outcome::Detected(self.smoother.smooth(&labels)),
            Err(e) => Outcome::degraded(
                DEFAULT_PROGRESSION.to_vec(),
                format!("harmony matching failed: {e}"),
            ),
        }
    }

    /// Chord of a live buffer of mono samples.
    pub fn match_harmony_realtime(&self, buffer: &[f32], sample_rate: u32) -> Outcome<ChordLabel> {
        let audio = DecodedAudio {
            samples: buffer.to_vec(),
            sample_rate,
        };
        self.match_decoded_realtime(&audio)
    }

    /// Chord of a live buffer of little-endian `f32` bytes.
    pub fn match_harmony_realtime_bytes(
        &self,
        buffer: &[u8],
        sample_rate: u32,
    ) -> Outcome<ChordLabel> {
        let source = AudioSource::Bytes {
            data: buffer.to_vec(),
            sample_rate,
        };
        match self.frontend.decode(&source) {
            Ok(audio) => self.match_decoded_realtime(&audio),
            Err(e) => Outcome::degraded(DEFAULT_CHORD, format!("live buffer unreadable: {e}")),
        }
    }

    fn match_decoded_realtime(&self, audio: &DecodedAudio) -> Outcome<ChordLabel> {
        let chroma = if audio.sample_rate == 0 {
            Err(FeatureError::Configuration("sample_rate cannot be zero".into()))
        } else {
            self.frontend.mean_chroma(audio)
        };
        match chroma {
            Ok(c) if c.is_silent() => Outcome::degraded(DEFAULT_CHORD, "live buffer is silent"),
            Ok(c) => Outcome::Detected(self.matcher.match_chroma(&c)),
            Err(e) => Outcome::degraded(DEFAULT_CHORD, format!("live buffer unreadable: {e}")),
        }
    }

    /// Key of a whole source.
    pub fn detect_key(&self, source: &AudioSource) -> Outcome<KeyEstimate> {
        let frames = self
            .frontend
            .decode(source)
            .and_then(|audio| self.frontend.chroma_frames(&audio, self.frame_length));
        match frames {
            Ok(frames) => self.key_estimator.estimate(&frames),
            Err(e) => Outcome::degraded(KeyEstimate::C_MAJOR, format!("key detection failed: {e}")),
        }
    }

    /// Normalized loudness per `frame_length`-second frame.
    pub fn analyze_intensity(&self, source: &AudioSource, frame_length: f32) -> Outcome<Vec<f32>> {
        if !(frame_length.is_finite() && frame_length > 0.0) {
            return Outcome::degraded(
                vec![DEFAULT_INTENSITY],
                format!("frame_length must be positive, got {frame_length}"),
            );
        }
        match self.frontend.decode(source) {
            Ok(audio) => {
                let curve =
                    IntensityTracker::new(frame_length).track(&audio.samples, audio.sample_rate);
                Outcome::Detected(curve.iter().collect())
            }
            Err(e) => Outcome::degraded(
                vec![DEFAULT_INTENSITY],
                format!("intensity analysis failed: {e}"),
            ),
        }
    }

    /// Loudness curve with the configured intensity frame length.
    pub fn intensity(&self, source: &AudioSource) -> Outcome<Vec<f32>> {
        self.analyze_intensity(source, self.intensity_frame_length)
    }

    /// Chord best matching a set of simultaneous notes.
    pub fn match_notes(&self, notes: &[NoteEvent]) -> Outcome<ChordLabel> {
        let histogram = pitch_class_histogram(notes);
        if histogram.is_silent() {
            return Outcome::degraded(DEFAULT_CHORD, "no sounding notes");
        }
        Outcome::Detected(self.matcher.match_chroma(&histogram))
    }

    /// Chord progression of a note sequence, one histogram per
    /// `segment_seconds`.
    pub fn progression_from_notes(
        &self,
        notes: &[NoteEvent],
        segment_seconds: f32,
    ) -> Outcome<Progression> {
        let segments: Vec<_> = segment_histograms(notes, segment_seconds)
            .into_iter()
            .filter(|h| !h.is_silent())
            .collect();
        if segments.is_empty() {
            return Outcome::degraded(DEFAULT_PROGRESSION.to_vec(), "no sounding notes");
        }
        let labels = self.matcher.match_frames(&segments);
        Outcome::Detected(self.smoother.smooth(&labels))
    }

    /// Key of a note sequence.
    pub fn detect_key_from_notes(&self, notes: &[NoteEvent]) -> Outcome<KeyEstimate> {
        if notes.is_empty() {
            return Outcome::degraded(KeyEstimate::C_MAJOR, "no notes to analyze");
        }
        self.key_estimator.estimate(&[pitch_class_histogram(notes)])
    }
}

impl Default for HarmonyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_estimator::Mode;

    fn chord_notes(pitches: &[u8], start: f32) -> Vec<NoteEvent> {
        pitches
            .iter()
            .map(|&pitch| NoteEvent {
                pitch,
                start,
                duration: 1.0,
                velocity: 100,
            })
            .collect()
    }

    #[test]
    fn unreadable_source_degrades_to_defaults() {
        let a = HarmonyAnalyzer::new();
        let src = AudioSource::file("missing.flac");

        let prog = a.match_harmony(&src, 0.5);
        assert!(prog.is_degraded());
        assert_eq!(prog.value().as_slice(), &DEFAULT_PROGRESSION);

        let key = a.detect_key(&src);
        assert!(key.is_degraded());
        assert_eq!(*key.value(), KeyEstimate::C_MAJOR);

        let intensity = a.analyze_intensity(&src, 1.0);
        assert!(intensity.is_degraded());
        assert_eq!(intensity.into_inner(), vec![DEFAULT_INTENSITY]);
    }

    #[test]
    fn silent_source_has_zero_intensity() {
        let a = HarmonyAnalyzer::new();
        let src = AudioSource::samples(vec![0.0; 44_100], 22_050);
        let out = a.analyze_intensity(&src, 0.5);
        assert!(!out.is_degraded());
        assert_eq!(out.into_inner(), vec![0.0; 4]);
    }

    #[test]
    fn malformed_live_bytes_degrade() {
        let a = HarmonyAnalyzer::new();
        let out = a.match_harmony_realtime_bytes(&[0, 1, 2], 22_050);
        assert!(out.is_degraded());
        assert_eq!(out.into_inner(), DEFAULT_CHORD);
    }

    #[test]
    fn silent_live_buffer_is_degraded() {
        let a = HarmonyAnalyzer::new();
        let out = a.match_harmony_realtime(&[0.0; 4096], 22_050);
        assert!(out.is_degraded());
    }

    #[test]
    fn notes_match_chords() {
        let a = HarmonyAnalyzer::new();
        // G B D F
        let out = a.match_notes(&chord_notes(&[55, 59, 62, 65], 0.0));
        assert_eq!(out.detected().map(|c| c.to_string()), Some("G7".to_string()));
        assert!(a.match_notes(&[]).is_degraded());
    }

    #[test]
    fn note_progression() {
        let a = HarmonyAnalyzer::builder()
            .smoothing_window(1)
            .smoothing_mode(SmoothingMode::AdjacentRuns)
            .build();
        let mut notes = chord_notes(&[60, 64, 67], 0.0);
        notes.extend(chord_notes(&[57, 60, 64], 1.0));
        notes.extend(chord_notes(&[53, 57, 60], 2.0));
        notes.extend(chord_notes(&[60, 64, 67], 3.0));
        let prog: Vec<String> = a
            .progression_from_notes(&notes, 1.0)
            .into_inner()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(prog, vec!["C", "Am", "F", "C"]);
    }

    #[test]
    fn key_from_notes() {
        let a = HarmonyAnalyzer::new();
        // A natural minor scale with a long tonic
        let mut notes: Vec<NoteEvent> = [57u8, 59, 60, 62, 64, 65, 67]
            .iter()
            .enumerate()
            .map(|(i, &pitch)| NoteEvent {
                pitch,
                start: i as f32 * 0.5,
                duration: 0.5,
                velocity: 100,
            })
            .collect();
        notes.push(NoteEvent {
            pitch: 69,
            start: 3.5,
            duration: 2.0,
            velocity: 100,
        });
        let key = a.detect_key_from_notes(&notes).into_inner();
        assert_eq!(key.root, NoteName::A);
        assert_eq!(key.mode, Mode::Minor);
    }
}
