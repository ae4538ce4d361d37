//! End-to-end session tests against the mock transport

use serde_json::json;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::advance;

use voxlink::{
    AnalyticsConfig, MockTransport, Party, PlaybackState, RpcRequest, Session, SessionConfig,
    SessionEvent, ToolDefinition, ToolParameter, TrackInfo, TrackKind, TransportEvent,
    VoxlinkError,
};

/// Analytics with the periodic reporter effectively disabled, so tests
/// control every event on the stream.
fn quiet_analytics() -> AnalyticsConfig {
    AnalyticsConfig {
        report_interval: Duration::from_secs(3600),
        ..AnalyticsConfig::default()
    }
}

fn config() -> SessionConfig {
    SessionConfig::new("wss://voice.test", "token").with_analytics(quiet_analytics())
}

fn audio_track(id: &str) -> TrackInfo {
    TrackInfo {
        id: id.to_string(),
        participant: "agent".to_string(),
        kind: TrackKind::Audio,
        muted: false,
        subscribed_at: chrono::Utc::now(),
    }
}

fn add_tool() -> ToolDefinition {
    ToolDefinition::from_fn(
        "add",
        "Add two numbers",
        vec![
            ToolParameter::required("a", "first addend"),
            ToolParameter::required("b", "second addend"),
        ],
        |args| async move {
            let a = args[0].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                reason: "a is not a number".to_string(),
            })?;
            let b = args[1].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                reason: "b is not a number".to_string(),
            })?;
            Ok(json!(a + b))
        },
    )
}

async fn expect(events: &mut voxlink::EventStream, event_type: &str) -> SessionEvent {
    for _ in 0..200 {
        match events.next().await {
            Some(event) if event.event_type() == event_type => return event,
            Some(_) => continue,
            None => break,
        }
    }
    panic!("did not observe a '{event_type}' event");
}

async fn tick(ms: u64) {
    advance(Duration::from_millis(ms)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn speaking_then_listening_with_call_duration_metrics() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());

    session.start().await;
    let connected = expect(&mut events, "connected").await;
    assert!(matches!(connected, SessionEvent::Connected { .. }));

    transport.push_event(TransportEvent::TrackSubscribed {
        track: audio_track("t1"),
    });
    expect(&mut events, "track_subscribed").await;

    // Two seconds of agent speech, then silence.
    for _ in 0..20 {
        transport.push_event(TransportEvent::AudioLevel {
            party: Party::Agent,
            level: 0.2,
        });
        tick(100).await;
    }
    transport.push_event(TransportEvent::AudioLevel {
        party: Party::Agent,
        level: 0.0,
    });
    tick(10).await;

    let mut speaking = 0;
    let mut listening = 0;
    while let Ok(Some(event)) = events.try_next() {
        match event.event_type() {
            "speaking" => speaking += 1,
            "listening" => listening += 1,
            _ => {}
        }
    }
    assert_eq!(speaking, 1);
    assert_eq!(listening, 1);

    let metrics = session.metrics();
    assert!(metrics.call_duration_ms.expect("call is live") >= 2000);
    assert!(metrics.agent_speaking_ms >= 1900);
    assert_eq!(metrics.track_count, 1);
    assert_eq!(metrics.connect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn registered_tool_answers_inbound_rpc() {
    let transport = MockTransport::new();
    let (session, mut events) =
        Session::new(transport.clone(), config().with_tools(vec![add_tool()]));
    session.start().await;
    expect(&mut events, "connected").await;

    let (tx, rx) = oneshot::channel();
    transport.push_event(TransportEvent::Rpc(RpcRequest {
        method: "add".to_string(),
        payload: r#"{"a":2,"b":3}"#.to_string(),
        responder: tx,
    }));

    assert_eq!(rx.await.unwrap(), "5");
    let invoked = expect(&mut events, "tool_invoked").await;
    assert!(matches!(invoked, SessionEvent::ToolInvoked { name } if name == "add"));
}

#[tokio::test(start_paused = true)]
async fn missing_rpc_argument_binds_as_null() {
    let transport = MockTransport::new();
    let probe = ToolDefinition::from_fn(
        "probe",
        "Report which arguments arrived",
        vec![
            ToolParameter::required("a", ""),
            ToolParameter::required("b", ""),
        ],
        |args| async move { Ok(json!([args[0].is_null(), args[1].is_null()])) },
    );
    let (session, mut events) = Session::new(transport.clone(), config().with_tools(vec![probe]));
    session.start().await;
    expect(&mut events, "connected").await;

    let (tx, rx) = oneshot::channel();
    transport.push_event(TransportEvent::Rpc(RpcRequest {
        method: "probe".to_string(),
        payload: r#"{"a":"x"}"#.to_string(),
        responder: tx,
    }));
    assert_eq!(rx.await.unwrap(), "[false,true]");
}

#[tokio::test(start_paused = true)]
async fn data_messages_surface_as_classified_events() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());
    session.start().await;
    expect(&mut events, "connected").await;

    transport.push_event(TransportEvent::DataReceived {
        payload: br#"{"type":"transcription","segments":[{"text":"hello","final":true}]}"#.to_vec(),
        sender: "agent".to_string(),
    });
    let event = expect(&mut events, "transcription").await;
    assert!(matches!(event, SessionEvent::Transcription { text, is_final: true } if text == "hello"));

    transport.push_event(TransportEvent::DataReceived {
        payload: br#"{"type":"telemetry","value":42}"#.to_vec(),
        sender: "agent".to_string(),
    });
    let event = expect(&mut events, "custom").await;
    assert!(matches!(event, SessionEvent::Custom { sender, .. } if sender == "agent"));

    drop(session);
}

#[tokio::test(start_paused = true)]
async fn remote_disconnect_cleans_up_before_the_event() {
    let transport = MockTransport::new();
    let (session, mut events) =
        Session::new(transport.clone(), config().with_tools(vec![add_tool()]));
    session.start().await;
    expect(&mut events, "connected").await;

    transport.push_event(TransportEvent::TrackSubscribed {
        track: audio_track("t1"),
    });
    expect(&mut events, "track_subscribed").await;

    transport.push_event(TransportEvent::Disconnected {
        reason: "server closed".to_string(),
    });
    let event = expect(&mut events, "disconnected").await;
    assert!(matches!(event, SessionEvent::Disconnected { reason } if reason == "server closed"));

    // Cleanup already ran when the event was dispatched.
    assert!(session.tracks().is_empty());
    assert!(session.participants().is_empty());
    assert_eq!(session.metrics().vad_events, 0);

    // Tools were cleared in the cascade.
    let (tx, rx) = oneshot::channel();
    transport.push_event(TransportEvent::Rpc(RpcRequest {
        method: "add".to_string(),
        payload: "{}".to_string(),
        responder: tx,
    }));
    assert!(rx.await.unwrap().contains("unknown tool"));
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_end_is_safe_anytime() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());

    // Safe before the session ever started.
    session.cleanup();
    session.end().await;

    session.start().await;
    session.start().await;
    assert_eq!(transport.connect_calls(), 1);

    session.end().await;
    session.end().await;
    session.cleanup();

    let mut connected = 0;
    let mut disconnected = 0;
    while let Ok(Some(event)) = events.try_next() {
        match event.event_type() {
            "connected" => connected += 1,
            "disconnected" => disconnected += 1,
            _ => {}
        }
    }
    assert_eq!(connected, 1);
    assert_eq!(disconnected, 1);
}

#[tokio::test(start_paused = true)]
async fn agent_audio_drains_through_the_render_callback() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());
    session.start().await;
    expect(&mut events, "connected").await;

    transport.push_event(TransportEvent::AgentAudio {
        samples: vec![0.25; 640],
    });
    tick(1).await;

    let engine = session.playback();
    engine.add_mark("sentence-end");
    let mut frame = [0.0f32; 320];
    engine.render(&mut frame);
    assert_eq!(frame[0], 0.25);

    // The second frame empties the queue; the next empty tick fires the
    // pending mark.
    engine.render(&mut frame);
    engine.render(&mut frame);
    tick(1).await;

    expect(&mut events, "playback_finished").await;
    let mark = expect(&mut events, "playback_mark").await;
    assert!(matches!(mark, SessionEvent::PlaybackMark { name } if name == "sentence-end"));
}

#[tokio::test(start_paused = true)]
async fn restart_reopens_the_playback_gate() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());

    session.start().await;
    expect(&mut events, "connected").await;
    session.end().await;
    expect(&mut events, "disconnected").await;
    assert_eq!(session.playback().state(), PlaybackState::Paused);

    session.start().await;
    expect(&mut events, "connected").await;
    assert_eq!(session.playback().state(), PlaybackState::Idle);

    transport.push_event(TransportEvent::AgentAudio {
        samples: vec![0.5; 320],
    });
    tick(1).await;

    let mut frame = [0.0f32; 320];
    session.playback().render(&mut frame);
    assert_eq!(frame[0], 0.5);
}

#[tokio::test(start_paused = true)]
async fn microphone_mute_round_trip() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());
    session.start().await;
    expect(&mut events, "connected").await;

    session.mute_microphone().await;
    expect(&mut events, "microphone_paused").await;
    assert!(!transport.microphone_enabled());

    session.unmute_microphone().await;
    expect(&mut events, "microphone_resumed").await;
    assert!(transport.microphone_enabled());
}

#[tokio::test(start_paused = true)]
async fn agent_audio_reaches_the_raw_tap() {
    let transport = MockTransport::new();
    let (session, mut events) = Session::new(transport.clone(), config());
    let mut tap_rx = session.enable_raw_audio(
        voxlink::RawAudioSource::Agent,
        voxlink::RawAudioEncoding::Pcm16,
    );
    session.start().await;
    expect(&mut events, "connected").await;

    transport.push_event(TransportEvent::AgentAudio {
        samples: vec![0.5; 320],
    });
    tick(1).await;

    let packet = tap_rx.try_recv().expect("tap packet");
    assert_eq!(packet.party, Party::Agent);
    assert_eq!(packet.payload.len(), 640);

    session.disable_raw_audio();
    transport.push_event(TransportEvent::AgentAudio {
        samples: vec![0.5; 320],
    });
    tick(1).await;
    assert!(tap_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn volume_is_clamped() {
    let transport = MockTransport::new();
    let (session, _events) = Session::new(transport, config());
    session.set_volume(3.0);
    assert_eq!(session.volume(), 1.0);
    session.set_volume(-0.5);
    assert_eq!(session.volume(), 0.0);
}
