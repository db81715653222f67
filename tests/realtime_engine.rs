//! Integration tests for the realtime clock running on its own thread.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use harmony_clock::{listener, Engine, EngineEvent, EventKind};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn counter(engine: &Engine, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    engine.add_listener(
        kind,
        listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    count
}

#[test]
fn running_clock_emits_beats_and_measures() {
    init_logging();
    let engine = Engine::builder()
        .tempo(300.0)
        .beats_per_measure(2)
        .build()
        .unwrap();
    let beats = counter(&engine, EventKind::Beat);
    let chords = counter(&engine, EventKind::ChordChange);

    engine.start(None).unwrap();
    thread::sleep(Duration::from_millis(900));
    assert!(engine.stop());

    let state = engine.current_state();
    let beat_count = beats.load(Ordering::SeqCst);
    assert!(!state.is_running);
    assert!(beat_count >= 3, "only {beat_count} beats");
    assert!(state.current_measure >= 2);
    // at most one chord change per measure
    assert!(chords.load(Ordering::SeqCst) <= (state.current_measure - 1) as usize);

    // nothing ticks after stop
    thread::sleep(Duration::from_millis(300));
    assert_eq!(beats.load(Ordering::SeqCst), beat_count);
}

#[test]
fn stop_times_out_on_a_stuck_listener() {
    init_logging();
    let engine = Engine::builder()
        .tempo(300.0)
        .stop_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    engine.add_listener(
        EventKind::Beat,
        listener(|_| {
            thread::sleep(Duration::from_millis(1000));
            Ok(())
        }),
    );

    // first beat lands at 200ms; stop while its listener is stuck
    engine.start(None).unwrap();
    thread::sleep(Duration::from_millis(300));
    assert!(!engine.stop());
    assert!(!engine.is_running());
}

#[test]
fn buffer_ingestion_announces_chord_changes() {
    init_logging();
    let engine = Engine::builder().build().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.add_listener(
        EventKind::ChordChange,
        listener(move |e| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        }),
    );

    let sr = 22_050;
    let samples: Vec<f32> = (0..sr)
        .map(|i| {
            let t = i as f32 / sr as f32;
            [261.63f32, 329.63, 392.0]
                .iter()
                .map(|f| (2.0 * PI * f * t).sin())
                .sum::<f32>()
                / 3.0
        })
        .collect();

    let chord = engine.ingest_buffer(&samples, sr).into_inner();
    engine.ingest_buffer(&samples, sr);
    assert_eq!(engine.current_state().current_chord, Some(chord));
    assert_eq!(*seen.lock().unwrap(), vec![EngineEvent::ChordChange { chord }]);

    // silence is a degraded match and leaves the chord alone
    assert!(engine.ingest_buffer(&vec![0.0; 4096], sr).is_degraded());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn listeners_can_be_managed_from_other_threads() {
    init_logging();
    let engine = Arc::new(Engine::builder().tempo(300.0).build().unwrap());
    let beats = counter(&engine, EventKind::Beat);
    engine.start(None).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let cb = listener(|_| Ok(()));
                engine.add_listener(EventKind::Beat, Arc::clone(&cb));
                engine.set_tempo(240.0);
                let _ = engine.current_state();
                assert!(engine.remove_listener(EventKind::Beat, &cb));
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    thread::sleep(Duration::from_millis(600));
    assert!(engine.stop());
    assert!(beats.load(Ordering::SeqCst) >= 1);
    assert_eq!(engine.current_state().tempo_bpm, 240.0);
}
