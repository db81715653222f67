//! # harmony_clock
//!
//! Estimate chords and keys from chroma features, and drive a real-time
//! musical clock that announces beats, measures and chord changes to
//! listeners.
//!
//! ## Example
//! ```rust
//! use harmony_clock::{ChordMatcher, ChromaVector, Engine, EventKind, listener};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Match a chroma frame against the 48 chord templates
//!     let matcher = ChordMatcher::new();
//!     let mut bins = [0.0; 12];
//!     for pc in [0, 4, 7] {
//!         bins[pc] = 1.0;
//!     }
//!     let chroma = ChromaVector::new(bins);
//!     println!("Detected {}", matcher.match_chroma(&chroma));
//!
//!     // 2) Build a clock and listen for chord changes
//!     let engine = Engine::builder().tempo(96.0).beats_per_measure(3).build()?;
//!     engine.add_listener(
//!         EventKind::ChordChange,
//!         listener(|event| {
//!             println!("{event:?}");
//!             Ok(())
//!         }),
//!     );
//!
//!     // 3) Run it, feeding live audio with `engine.ingest_buffer(..)`
//!     engine.start(None)?;
//!     engine.stop();
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! ## Features
//! - `ogg` (default): decode Ogg Vorbis files via `lewton`

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Chord, key and intensity queries.
pub use analyzer::{
    HarmonyAnalyzer, HarmonyAnalyzerBuilder, DEFAULT_CHORD, DEFAULT_INTENSITY, DEFAULT_PROGRESSION,
};

/// Template-correlation chord matcher.
pub use chord_matcher::{ChordError, ChordMatcher, ScoredChord};

/// Chord labels and the template bank.
pub use chord_template::{ChordKind, ChordLabel, ChordTemplate, NoteName, TemplateBank};

/// Chroma frames and symbolic notes.
pub use chroma::{pitch_class_histogram, ChromaVector, FrameSequence, NoteEvent};

/// FFT chroma extraction.
pub use chromagram::{ChromaExtractor, ChromaExtractorBuilder, FeatureError};

/// Realtime clock and listeners.
pub use engine::{
    listener, ArrangementCue, Engine, EngineBuilder, EngineError, EngineEvent, EngineState,
    EventKind, Listener, ListenerError, ListenerRegistration,
};

/// Audio decoding boundary.
pub use frontend::{AudioFrontend, AudioSource, DecodedAudio, SpectralFrontend};

/// Loudness curves.
pub use intensity::{IntensityCurve, IntensityTracker};

/// Key estimation.
pub use key_estimator::{KeyEstimate, KeyEstimator, Mode};

/// Detected-or-fallback results.
pub use outcome::Outcome;

/// Progression smoothing.
pub use smoother::{Progression, ProgressionSmoother, SmoothingMode};

/// Harmony query API module.
pub mod analyzer;

/// Chord matching module.
pub mod chord_matcher;

/// Chord template module.
pub mod chord_template;

/// Chroma vector module.
pub mod chroma;

/// Chromagram computation module.
pub mod chromagram;

/// Realtime engine module.
pub mod engine;

/// Audio frontend module.
pub mod frontend;

/// Intensity tracking module.
pub mod intensity;

/// Key estimation module.
pub mod key_estimator;

/// Outcome module.
pub mod outcome;

/// Progression smoothing module.
pub mod smoother;
