//! Unit tests for the playback engine
//!
//! Covers FIFO delivery, pause/resume gating, clear semantics, mark
//! ordering and the finished signal.

use tokio::sync::mpsc::UnboundedReceiver;
use voxlink_media::{PlaybackEngine, PlaybackEvent, PlaybackState};

fn drain_events(rx: &mut UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn rendered_samples_equal_enqueued_samples_in_fifo_order() {
    let (engine, _rx) = PlaybackEngine::new();
    let input: Vec<f32> = (0..100).map(|i| (i as f32) / 200.0).collect();

    engine.enqueue(&input[..30]);
    engine.enqueue(&input[30..75]);
    engine.enqueue(&input[75..]);

    let mut rendered = Vec::new();
    let mut frame = [0.0f32; 16];
    while engine.queued_samples() > 0 {
        engine.render(&mut frame);
        rendered.extend_from_slice(&frame);
    }

    // No reordering, no duplication, no loss; trailing samples beyond
    // the input are zero padding.
    assert_eq!(&rendered[..input.len()], &input[..]);
    assert!(rendered[input.len()..].iter().all(|&s| s == 0.0));
}

#[test]
fn underrun_renders_silence_not_an_error() {
    let (engine, _rx) = PlaybackEngine::new();
    engine.enqueue(&[0.5, 0.5]);

    let mut frame = [1.0f32; 8];
    engine.render(&mut frame);
    assert_eq!(&frame[..2], &[0.5, 0.5]);
    assert!(frame[2..].iter().all(|&s| s == 0.0));

    // Further renders on an empty queue are all-zero frames.
    let mut frame = [1.0f32; 8];
    engine.render(&mut frame);
    assert!(frame.iter().all(|&s| s == 0.0));
}

#[test]
fn pause_yields_silence_and_preserves_the_queue() {
    let (engine, _rx) = PlaybackEngine::new();
    let input: Vec<f32> = (1..=8).map(|i| i as f32 / 10.0).collect();
    engine.enqueue(&input);

    let mut frame = [0.0f32; 4];
    engine.render(&mut frame);
    assert_eq!(&frame, &[0.1, 0.2, 0.3, 0.4]);

    engine.pause();
    assert_eq!(engine.state(), PlaybackState::Paused);
    for _ in 0..5 {
        let mut frame = [1.0f32; 4];
        engine.render(&mut frame);
        assert!(frame.iter().all(|&s| s == 0.0));
    }
    assert_eq!(engine.queued_samples(), 4);

    // Resume continues exactly where the queue left off.
    engine.resume();
    let mut frame = [0.0f32; 4];
    engine.render(&mut frame);
    assert_eq!(&frame, &[0.5, 0.6, 0.7, 0.8]);
}

#[test]
fn clear_discards_samples_and_marks_and_forces_pause() {
    let (engine, mut rx) = PlaybackEngine::new();
    engine.enqueue(&[0.1; 64]);
    engine.add_mark("sentence-1");
    engine.add_mark("sentence-2");

    engine.clear();
    assert_eq!(engine.queued_samples(), 0);
    assert_eq!(engine.pending_marks(), 0);
    assert_eq!(engine.state(), PlaybackState::Paused);

    // A render immediately after observes silence and fires no stale
    // finished or mark signal from before the clear.
    let mut frame = [1.0f32; 16];
    engine.render(&mut frame);
    assert!(frame.iter().all(|&s| s == 0.0));
    assert!(drain_events(&mut rx).is_empty());

    // Even after resuming, the pre-clear drain does not fire events.
    engine.resume();
    engine.render(&mut frame);
    assert!(drain_events(&mut rx).is_empty());
}

#[test]
fn flush_empties_the_queue_without_pausing() {
    let (engine, _rx) = PlaybackEngine::new();
    engine.enqueue(&[0.1; 32]);
    engine.flush();
    assert_eq!(engine.queued_samples(), 0);
    assert_ne!(engine.state(), PlaybackState::Paused);
}

#[test]
fn marks_fire_in_insertion_order_after_preceding_audio() {
    let (engine, mut rx) = PlaybackEngine::new();
    engine.enqueue(&[0.2; 8]);
    engine.add_mark("first");
    engine.add_mark("second");

    let mut frame = [0.0f32; 4];
    engine.render(&mut frame);
    // Audio still pending: no mark yet.
    assert!(drain_events(&mut rx).is_empty());

    engine.render(&mut frame);
    let events = drain_events(&mut rx);
    assert_eq!(
        events,
        vec![
            PlaybackEvent::Finished,
            PlaybackEvent::Mark {
                name: "first".to_string()
            }
        ]
    );

    // One mark per empty tick, in insertion order.
    engine.render(&mut frame);
    assert_eq!(
        drain_events(&mut rx),
        vec![PlaybackEvent::Mark {
            name: "second".to_string()
        }]
    );
}

#[test]
fn mark_added_after_drain_fires_on_next_tick() {
    let (engine, mut rx) = PlaybackEngine::new();
    engine.enqueue(&[0.1; 4]);
    let mut frame = [0.0f32; 4];
    engine.render(&mut frame);
    drain_events(&mut rx);

    engine.add_mark("late");
    engine.render(&mut frame);
    assert_eq!(
        drain_events(&mut rx),
        vec![PlaybackEvent::Mark {
            name: "late".to_string()
        }]
    );
}

#[test]
fn finished_fires_exactly_once_per_drain() {
    let (engine, mut rx) = PlaybackEngine::new();
    engine.enqueue(&[0.3; 4]);

    let mut frame = [0.0f32; 8];
    engine.render(&mut frame);
    assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Finished]);
    assert_eq!(engine.state(), PlaybackState::Finished);

    // Repeated empty renders do not re-signal.
    engine.render(&mut frame);
    engine.render(&mut frame);
    assert!(drain_events(&mut rx).is_empty());

    // Re-enqueueing rearms the signal for the next drain.
    engine.enqueue(&[0.3; 4]);
    assert_eq!(engine.state(), PlaybackState::Playing);
    engine.render(&mut frame);
    assert_eq!(drain_events(&mut rx), vec![PlaybackEvent::Finished]);
}

#[test]
fn empty_enqueue_is_a_no_op() {
    let (engine, mut rx) = PlaybackEngine::new();
    engine.enqueue(&[]);
    assert_eq!(engine.state(), PlaybackState::Idle);

    // An idle engine never signals finished.
    let mut frame = [0.0f32; 4];
    engine.render(&mut frame);
    assert!(drain_events(&mut rx).is_empty());
}

#[test]
fn volume_scales_rendered_samples_and_is_clamped() {
    let (engine, _rx) = PlaybackEngine::new();
    engine.set_volume(0.5);
    engine.enqueue(&[0.8, 0.8]);

    let mut frame = [0.0f32; 2];
    engine.render(&mut frame);
    assert!((frame[0] - 0.4).abs() < 1e-6);

    engine.set_volume(7.0);
    assert_eq!(engine.volume(), 1.0);
    engine.set_volume(-1.0);
    assert_eq!(engine.volume(), 0.0);
}
