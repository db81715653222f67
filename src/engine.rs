//! Realtime Engine
//!
//! A musical clock that runs on its own thread, advancing beat and measure
//! counters at the current tempo and announcing beats and chord changes to
//! registered listeners. Live audio buffers can be pushed in at any time to
//! re-estimate the current chord.
//!
//! All musical state sits behind one mutex. The clock thread and buffer
//! ingestion both decide on chord changes inside that critical section, so
//! every `ChordChange` event reports a chord that was current when it was
//! decided. Listeners are called after the lock is released, on whichever
//! thread produced the event, so events from the clock thread and from an
//! ingesting thread may arrive in a different order than the state changes
//! they report.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::analyzer::{HarmonyAnalyzer, DEFAULT_CHORD, DEFAULT_PROGRESSION};
use crate::chord_template::ChordLabel;
use crate::frontend::AudioSource;
use crate::key_estimator::KeyEstimate;
use crate::outcome::Outcome;

/// Slowest allowed tempo in BPM.
pub const MIN_TEMPO: f32 = 30.0;
/// Fastest allowed tempo in BPM.
pub const MAX_TEMPO: f32 = 300.0;

/// Error a listener can report back to the engine.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A shared event callback. Identity (for removal) is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&EngineEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&EngineEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Errors from engine control.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The clock thread could not be started.
    #[error("failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A measure must have at least one beat.
    #[error("invalid time signature: {0} beats per measure")]
    InvalidTimeSignature(u32),
}

/// Event categories listeners subscribe to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Every clock beat.
    Beat,
    /// The current chord changed.
    ChordChange,
    /// The current key changed.
    KeyChange,
}

/// Something that happened on the clock or in the audio.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A beat ticked.
    Beat {
        /// Beat within the measure, 1-based.
        beat: u32,
        /// Measure number, 1-based.
        measure: u32,
    },
    /// The current chord changed.
    ChordChange {
        /// The new chord.
        chord: ChordLabel,
    },
    /// The current key changed.
    KeyChange {
        /// The new key.
        key: KeyEstimate,
    },
}

impl EngineEvent {
    /// Which listeners receive this event.
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Beat { .. } => EventKind::Beat,
            EngineEvent::ChordChange { .. } => EventKind::ChordChange,
            EngineEvent::KeyChange { .. } => EventKind::KeyChange,
        }
    }
}

/// A snapshot of the engine's musical state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// True while the clock thread runs.
    pub is_running: bool,
    /// Tempo in BPM, within 30..=300.
    pub tempo_bpm: f32,
    /// Beats per measure, at least 1.
    pub beats_per_measure: u32,
    /// Beat within the measure, 1..=beats_per_measure.
    pub current_beat: u32,
    /// Measure number, starting at 1.
    pub current_measure: u32,
    /// Last announced chord.
    pub current_chord: Option<ChordLabel>,
    /// Last announced key.
    pub current_key: Option<KeyEstimate>,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            is_running: false,
            tempo_bpm: 120.0,
            beats_per_measure: 4,
            current_beat: 1,
            current_measure: 1,
            current_chord: None,
            current_key: None,
        }
    }
}

/// What an arranger needs to know right now.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ArrangementCue {
    /// Current key, or C major if none has been set.
    pub key: KeyEstimate,
    /// Current chord, or C if none has been announced.
    pub chord: ChordLabel,
    /// Current measure.
    pub measure: u32,
    /// Current beat.
    pub beat: u32,
}

/// A subscription: event kind plus callback.
#[derive(Clone)]
pub struct ListenerRegistration {
    /// Event kind the callback receives.
    pub kind: EventKind,
    /// The callback.
    pub callback: Listener,
}

impl Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("kind", &self.kind)
            .field("callback", &Arc::as_ptr(&self.callback))
            .finish()
    }
}

/// Builder for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    tempo: f32,
    beats_per_measure: u32,
    progression: Vec<ChordLabel>,
    stop_timeout: Duration,
    analyzer: Option<HarmonyAnalyzer>,
}

impl EngineBuilder {
    /// Start with default parameters:
    /// tempo = 120 BPM, beats_per_measure = 4,
    /// reference progression = C G Am F, stop_timeout = 1 s.
    pub fn new() -> Self {
        EngineBuilder {
            tempo: 120.0,
            beats_per_measure: 4,
            progression: DEFAULT_PROGRESSION.to_vec(),
            stop_timeout: Duration::from_secs(1),
            analyzer: None,
        }
    }

    /// Initial tempo in BPM; clamped to 30..=300.
    pub fn tempo(mut self, bpm: f32) -> Self {
        self.tempo = bpm;
        self
    }

    /// Initial beats per measure.
    pub fn beats_per_measure(mut self, beats: u32) -> Self {
        self.beats_per_measure = beats;
        self
    }

    /// Chords the clock steps through, one per measure, when no live audio
    /// is driving chord changes. An empty progression disables clock-driven
    /// chord changes.
    pub fn reference_progression(mut self, chords: Vec<ChordLabel>) -> Self {
        self.progression = chords;
        self
    }

    /// How long `stop()` waits for the clock thread.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Analyzer used for live buffers.
    pub fn analyzer(mut self, analyzer: HarmonyAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Build the engine, idle.
    pub fn build(self) -> Result<Engine, EngineError> {
        if self.beats_per_measure == 0 {
            return Err(EngineError::InvalidTimeSignature(0));
        }
        let state = EngineState {
            tempo_bpm: clamp_tempo(self.tempo).unwrap_or(120.0),
            beats_per_measure: self.beats_per_measure,
            ..EngineState::default()
        };
        Ok(Engine {
            shared: Arc::new(Shared {
                clock: Mutex::new(Clock {
                    state,
                    progression_index: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                progression: self.progression,
                analyzer: self.analyzer.unwrap_or_default(),
            }),
            worker: Mutex::new(None),
            stop_timeout: self.stop_timeout,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Clock {
    state: EngineState,
    progression_index: usize,
}

impl Clock {
    /// One beat forward. Returns the events to announce, in order.
    fn advance(&mut self, progression: &[ChordLabel]) -> Vec<EngineEvent> {
        let mut events = Vec::with_capacity(2);
        let s = &mut self.state;
        s.current_beat += 1;
        if s.current_beat > s.beats_per_measure {
            s.current_beat = 1;
            s.current_measure += 1;

            if !progression.is_empty() {
                self.progression_index = (self.progression_index + 1) % progression.len();
                let chord = progression[self.progression_index];
                if s.current_chord != Some(chord) {
                    s.current_chord = Some(chord);
                    events.push(EngineEvent::ChordChange { chord });
                }
            }
        }
        events.push(EngineEvent::Beat {
            beat: s.current_beat,
            measure: s.current_measure,
        });
        events
    }
}

struct Shared {
    clock: Mutex<Clock>,
    listeners: Mutex<Vec<ListenerRegistration>>,
    progression: Vec<ChordLabel>,
    analyzer: HarmonyAnalyzer,
}

impl Shared {
    fn tick(&self) {
        let events = lock(&self.clock).advance(&self.progression);
        self.dispatch_all(&events);
    }

    fn beat_interval(&self) -> Duration {
        Duration::from_secs_f32(60.0 / lock(&self.clock).state.tempo_bpm)
    }

    fn is_running(&self) -> bool {
        lock(&self.clock).state.is_running
    }

    fn set_chord(&self, chord: ChordLabel) {
        let changed = {
            let mut clock = lock(&self.clock);
            let changed = clock.state.current_chord != Some(chord);
            clock.state.current_chord = Some(chord);
            changed
        };
        if changed {
            self.dispatch(&EngineEvent::ChordChange { chord });
        }
    }

    fn dispatch_all(&self, events: &[EngineEvent]) {
        for event in events {
            self.dispatch(event);
        }
    }

    /// Call every listener for the event's kind, in registration order.
    /// Failures are logged and never stop the remaining listeners.
    fn dispatch(&self, event: &EngineEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = lock(&self.listeners)
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.callback))
            .collect();

        for callback in targets {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Error in {kind:?} listener: {e}"),
                Err(_) => log::error!("{kind:?} listener panicked"),
            }
        }
    }
}

struct Worker {
    stop: Sender<()>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// The realtime musical clock.
///
/// All methods take `&self`, so an engine can be shared between threads
/// behind an `Arc`. Dropping the engine stops the clock.
pub struct Engine {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    stop_timeout: Duration,
}

impl Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.current_state())
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

impl Engine {
    /// Return a builder to customize the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Start the clock thread. Does nothing if it is already running.
    ///
    /// `device` selects an audio input; live audio reaches the engine via
    /// [`Engine::ingest_buffer`], so the selector is only recorded in the
    /// log.
    pub fn start(&self, device: Option<usize>) -> Result<(), EngineError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        lock(&self.shared.clock).state.is_running = true;
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);

        let spawned = std::thread::Builder::new()
            .name("harmony-clock".into())
            .spawn(move || {
                run_clock(&shared, &stop_rx);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                log::info!("Clock started (input device {device:?})");
                *worker = Some(Worker {
                    stop: stop_tx,
                    done: done_rx,
                    handle,
                });
                Ok(())
            }
            Err(e) => {
                lock(&self.shared.clock).state.is_running = false;
                log::error!("Error starting clock: {e}");
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Stop the clock thread and wait for it, up to the stop timeout.
    ///
    /// Returns false if the thread did not exit in time; it is then left to
    /// finish on its own. Stopping an idle engine returns true.
    pub fn stop(&self) -> bool {
        let worker = {
            let mut guard = lock(&self.worker);
            let Some(worker) = guard.take() else {
                return true;
            };
            // flag and worker change together under the worker lock
            lock(&self.shared.clock).state.is_running = false;
            let _ = worker.stop.try_send(());
            worker
        };

        match worker.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Clock thread panicked");
                }
                log::info!("Clock stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Clock thread did not stop within {:?}; detaching",
                    self.stop_timeout
                );
                false
            }
        }
    }

    /// True while the clock thread runs.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Advance one beat exactly as the clock thread does, announcing the
    /// resulting events on the calling thread.
    pub fn tick(&self) {
        self.shared.tick();
    }

    /// Run a live buffer through the chord matcher and announce a chord
    /// change if the chord differs from the current one. Degraded matches
    /// leave the state untouched.
    pub fn ingest_buffer(&self, samples: &[f32], sample_rate: u32) -> Outcome<ChordLabel> {
        let outcome = self.shared.analyzer.match_harmony_realtime(samples, sample_rate);
        self.apply_live_chord(&outcome);
        outcome
    }

    /// Like [`Engine::ingest_buffer`] for little-endian `f32` bytes.
    pub fn ingest_bytes(&self, bytes: &[u8], sample_rate: u32) -> Outcome<ChordLabel> {
        let outcome = self
            .shared
            .analyzer
            .match_harmony_realtime_bytes(bytes, sample_rate);
        self.apply_live_chord(&outcome);
        outcome
    }

    fn apply_live_chord(&self, outcome: &Outcome<ChordLabel>) {
        if let Outcome::Detected(chord) = outcome {
            self.shared.set_chord(*chord);
        }
    }

    /// Set the current key, announcing a key change if it differs.
    pub fn set_key(&self, key: KeyEstimate) {
        let changed = {
            let mut clock = lock(&self.shared.clock);
            let changed = clock.state.current_key != Some(key);
            clock.state.current_key = Some(key);
            changed
        };
        if changed {
            self.shared.dispatch(&EngineEvent::KeyChange { key });
        }
    }

    /// Detect the key of a source and make it current. Degraded detections
    /// leave the state untouched.
    pub fn update_key(&self, source: &AudioSource) -> Outcome<KeyEstimate> {
        let outcome = self.shared.analyzer.detect_key(source);
        if let Outcome::Detected(key) = outcome {
            self.set_key(key);
        }
        outcome
    }

    /// Register a callback for one kind of event.
    pub fn add_listener(&self, kind: EventKind, callback: Listener) {
        lock(&self.shared.listeners).push(ListenerRegistration { kind, callback });
    }

    /// Remove the first registration with this kind and callback. Returns
    /// false if there was none.
    pub fn remove_listener(&self, kind: EventKind, callback: &Listener) -> bool {
        let mut listeners = lock(&self.shared.listeners);
        match listeners
            .iter()
            .position(|r| r.kind == kind && Arc::ptr_eq(&r.callback, callback))
        {
            Some(i) => {
                listeners.remove(i);
                true
            }
            None => false,
        }
    }

    /// Set the tempo, clamped to 30..=300 BPM. Takes effect from the next
    /// beat. NaN is ignored.
    pub fn set_tempo(&self, bpm: f32) {
        match clamp_tempo(bpm) {
            Some(bpm) => lock(&self.shared.clock).state.tempo_bpm = bpm,
            None => log::warn!("Ignoring tempo {bpm}"),
        }
    }

    /// Set the number of beats per measure. Zero is rejected. A current
    /// beat past the new measure length is pulled back to the last beat.
    pub fn set_time_signature(&self, beats_per_measure: u32) -> Result<(), EngineError> {
        if beats_per_measure == 0 {
            return Err(EngineError::InvalidTimeSignature(beats_per_measure));
        }
        let mut clock = lock(&self.shared.clock);
        clock.state.beats_per_measure = beats_per_measure;
        clock.state.current_beat = clock.state.current_beat.min(beats_per_measure);
        Ok(())
    }

    /// A consistent copy of the current state.
    pub fn current_state(&self) -> EngineState {
        lock(&self.shared.clock).state.clone()
    }

    /// Current key, chord and position, with C major / C fallbacks.
    pub fn arrangement_cue(&self) -> ArrangementCue {
        let state = self.current_state();
        ArrangementCue {
            key: state.current_key.unwrap_or(KeyEstimate::C_MAJOR),
            chord: state.current_chord.unwrap_or(DEFAULT_CHORD),
            measure: state.current_measure,
            beat: state.current_beat,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clock thread body: wait one beat, then tick, until told to stop.
fn run_clock(shared: &Shared, stop: &Receiver<()>) {
    loop {
        match stop.recv_timeout(shared.beat_interval()) {
            Err(RecvTimeoutError::Timeout) => shared.tick(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn clamp_tempo(bpm: f32) -> Option<f32> {
    if bpm.is_nan() {
        None
    } else {
        Some(bpm.clamp(MIN_TEMPO, MAX_TEMPO))
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
