//! Session orchestration
//!
//! A [`Session`] composes the connection manager, playback engine,
//! analytics aggregator and tool registry behind one event stream. The
//! wiring between subsystems is fixed at construction: transport events
//! flow through a single pump task, each subsystem's derived events are
//! re-emitted on the unified stream, and cross-subsystem communication
//! is by event payload copy only.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxlink_analytics::{AnalyticsAggregator, AnalyticsEvent, EstimatedMetrics, VerifiedMetrics};
use voxlink_core::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats,
    ParticipantInfo, Party, RpcRequest, TrackInfo, Transport, TransportEvent,
};
use voxlink_media::{
    CaptureConfig, CapturePipeline, CapturedFrame, MediaError, OutputConfig, PlaybackEngine,
    PlaybackEvent, PlaybackSink, RawAudioEncoding, RawAudioPacket, RawAudioSource, RawAudioTap,
};

use crate::config::SessionConfig;
use crate::event::{EventStream, SessionEvent};
use crate::tools::{classify_data, ToolDefinition, ToolRegistry};

struct SessionInner {
    id: String,
    transport: Arc<dyn Transport>,
    connection: Arc<ConnectionManager>,
    playback: Arc<PlaybackEngine>,
    analytics: Arc<AnalyticsAggregator>,
    tools: Arc<ToolRegistry>,
    tap: Arc<RawAudioTap>,
    tracks: dashmap::DashMap<String, TrackInfo>,
    events: mpsc::UnboundedSender<SessionEvent>,
    epoch: Instant,
    started: AtomicBool,
    pending_tools: Mutex<Vec<ToolDefinition>>,
    capture: Mutex<Option<CapturePipeline>>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
    capture_config: CaptureConfig,
    output: Mutex<Option<PlaybackSink>>,
}

struct PumpReceivers {
    playback: mpsc::UnboundedReceiver<PlaybackEvent>,
    analytics: mpsc::UnboundedReceiver<AnalyticsEvent>,
}

/// One voice session with a remote agent
///
/// Created with [`Session::new`], driven by [`Session::start`] and
/// observed through the [`EventStream`] returned alongside it. All
/// lifecycle methods follow the same contract as the connection
/// manager: they never fail, errors surface as
/// [`SessionEvent::Error`] on the stream.
pub struct Session {
    inner: Arc<SessionInner>,
    receivers: Mutex<Option<PumpReceivers>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session over the given transport
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> (Self, EventStream) {
        let (playback, playback_rx) = PlaybackEngine::new();
        let (analytics, analytics_rx) = AnalyticsAggregator::new(config.analytics.clone());
        let connection = ConnectionManager::new(
            Arc::clone(&transport),
            ConnectionConfig {
                url: config.url.clone(),
                token: config.token.clone(),
                agent_state_key: config.agent_state_key.clone(),
            },
        );
        let (events, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4().to_string(),
            transport,
            connection: Arc::new(connection),
            playback: Arc::new(playback),
            analytics: Arc::new(analytics),
            tools: Arc::new(ToolRegistry::new()),
            tap: Arc::new(RawAudioTap::new()),
            tracks: dashmap::DashMap::new(),
            events,
            epoch: Instant::now(),
            started: AtomicBool::new(false),
            pending_tools: Mutex::new(config.tools),
            capture: Mutex::new(None),
            capture_task: Mutex::new(None),
            capture_config: config.capture,
            output: Mutex::new(None),
        });

        (
            Self {
                inner,
                receivers: Mutex::new(Some(PumpReceivers {
                    playback: playback_rx,
                    analytics: analytics_rx,
                })),
                pump: Mutex::new(None),
            },
            EventStream::new(events_rx),
        )
    }

    /// Session identifier, unique per instance
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Start the session
    ///
    /// Wires analytics, then tools, then establishes the connection.
    /// `Connected` is emitted on the stream before any event that
    /// depends on the connection. Calling on a running session is a
    /// no-op.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("start ignored, session already running");
            return;
        }
        info!(session = %self.inner.id, "starting session");

        // A previous teardown left the render gate closed; reopen it so
        // a restarted session is audible again.
        self.inner.playback.resume();
        self.inner
            .analytics
            .observe_connection(&self.inner.connection.stats());
        let tools = std::mem::take(&mut *self.inner.pending_tools.lock());
        if !tools.is_empty() {
            self.inner.tools.register(tools);
        }

        let events = self.inner.connection.connect().await;
        self.inner
            .analytics
            .observe_connection(&self.inner.connection.stats());
        self.inner.forward_connection_events(events);
        self.inner.analytics.start_reporting();
        self.spawn_pump();
    }

    /// End the session
    ///
    /// Tears down the transport and runs full cleanup (analytics, then
    /// audio, then tools) before the `Disconnected` event is
    /// dispatched. Safe to call repeatedly and on a never-started
    /// session.
    pub async fn end(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            self.cleanup();
            return;
        }
        info!(session = %self.inner.id, "ending session");
        let events = self.inner.connection.disconnect().await;
        self.inner.cleanup_subsystems();
        self.inner.forward_connection_events(events);
    }

    /// Release all session resources without a transport teardown
    ///
    /// Idempotent and safe on a never-started session.
    pub fn cleanup(&self) {
        self.inner.cleanup_subsystems();
    }

    /// Pause the session: mute the microphone and silence playback
    pub async fn pause(&self) {
        self.inner.playback.pause();
        self.inner.pause_capture();
        let events = self.inner.connection.pause().await;
        self.inner.forward_connection_events(events);
    }

    /// Resume a paused session
    pub async fn resume(&self) {
        self.inner.playback.resume();
        self.inner.resume_capture();
        let events = self.inner.connection.resume().await;
        self.inner.forward_connection_events(events);
    }

    /// Mute the outbound microphone without touching playback
    pub async fn mute_microphone(&self) {
        self.inner.pause_capture();
        let events = self.inner.connection.pause().await;
        self.inner.forward_connection_events(events);
    }

    /// Unmute the outbound microphone
    pub async fn unmute_microphone(&self) {
        self.inner.resume_capture();
        let events = self.inner.connection.resume().await;
        self.inner.forward_connection_events(events);
    }

    /// Shared playback engine
    ///
    /// Drive [`PlaybackEngine::render`] from a host-owned audio
    /// callback, or let [`Session::start_audio_output`] own the device.
    pub fn playback(&self) -> Arc<PlaybackEngine> {
        Arc::clone(&self.inner.playback)
    }

    /// Open the speaker and drain agent audio at the hardware rate
    pub fn start_audio_output(&self, config: OutputConfig) -> Result<(), MediaError> {
        let mut guard = self.inner.output.lock();
        if guard.is_some() {
            return Err(MediaError::StreamError {
                reason: "audio output already running".to_string(),
            });
        }
        *guard = Some(PlaybackSink::start(
            Arc::clone(&self.inner.playback),
            config,
        )?);
        Ok(())
    }

    /// Release the speaker; safe when not running
    pub fn stop_audio_output(&self) {
        self.inner.stop_audio_output();
    }

    /// Set the playback volume, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        self.inner.playback.set_volume(volume);
    }

    /// Current playback volume
    pub fn volume(&self) -> f32 {
        self.inner.playback.volume()
    }

    /// Replace the registered tool set
    pub fn register_tools(&self, tools: Vec<ToolDefinition>) {
        self.inner.tools.register(tools);
    }

    /// Start forwarding raw audio to the returned channel
    pub fn enable_raw_audio(
        &self,
        source: RawAudioSource,
        encoding: RawAudioEncoding,
    ) -> mpsc::UnboundedReceiver<RawAudioPacket> {
        self.inner.tap.enable(source, encoding)
    }

    /// Stop forwarding raw audio
    pub fn disable_raw_audio(&self) {
        self.inner.tap.disable();
    }

    /// Start the local microphone capture pipeline
    ///
    /// Captured frames are fed to the raw-audio tap and the analytics
    /// aggregator, and handed to the caller on the returned channel for
    /// forwarding to a streaming backend. Frames are dropped when the
    /// caller falls behind.
    pub fn start_capture(&self) -> Result<mpsc::Receiver<CapturedFrame>, MediaError> {
        let mut guard = self.inner.capture.lock();
        if guard.is_some() {
            return Err(MediaError::StreamError {
                reason: "capture already running".to_string(),
            });
        }
        let mut pipeline = CapturePipeline::new();
        let mut frames = pipeline.start(self.inner.capture_config.clone())?;
        *guard = Some(pipeline);
        drop(guard);

        let (tx, rx) = mpsc::channel(32);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                inner.tap.forward(Party::User, &frame.samples);
                let level = rms(&frame.samples);
                inner
                    .analytics
                    .observe_level(Party::User, level, inner.now_ms());
                if tx.try_send(frame).is_err() {
                    debug!("capture consumer is behind, dropping frame");
                }
            }
        });
        *self.inner.capture_task.lock() = Some(task);
        Ok(rx)
    }

    /// Stop the local capture pipeline; safe when not running
    pub fn stop_capture(&self) {
        self.inner.stop_capture();
    }

    /// Known remote participants
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.inner.connection.participants()
    }

    /// Currently subscribed remote tracks
    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.inner
            .tracks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Current verified call metrics
    pub fn metrics(&self) -> VerifiedMetrics {
        self.inner
            .analytics
            .observe_connection(&self.inner.connection.stats());
        self.inner.analytics.snapshot()
    }

    /// Estimated network metrics, derived from the quality label only
    pub fn estimated_metrics(&self) -> EstimatedMetrics {
        self.inner.analytics.estimated()
    }

    /// Connection counters snapshot
    pub fn connection_stats(&self) -> ConnectionStats {
        self.inner.connection.stats()
    }

    /// Current connection lifecycle state
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    fn spawn_pump(&self) {
        // The pump survives end(); a restarted session reuses it.
        let Some(receivers) = self.receivers.lock().take() else {
            return;
        };
        let transport_rx = self.inner.transport.take_events();
        if transport_rx.is_none() {
            warn!("transport event stream already consumed");
            self.inner.send(SessionEvent::Error {
                message: "transport event stream unavailable".to_string(),
            });
        }
        let inner = Arc::clone(&self.inner);
        *self.pump.lock() = Some(tokio::spawn(run_pump(
            inner,
            transport_rx,
            receivers.playback,
            receivers.analytics,
        )));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.inner.stop_capture();
        self.inner.stop_audio_output();
    }
}

async fn run_pump(
    inner: Arc<SessionInner>,
    mut transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    mut playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    mut analytics_rx: mpsc::UnboundedReceiver<AnalyticsEvent>,
) {
    loop {
        tokio::select! {
            event = recv_transport(&mut transport_rx) => match event {
                Some(event) => inner.handle_transport_event(event).await,
                None => break,
            },
            Some(event) = playback_rx.recv() => inner.handle_playback_event(event),
            Some(event) = analytics_rx.recv() => inner.handle_analytics_event(event),
        }
    }
    debug!("session event pump stopped");
}

async fn recv_transport(
    rx: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionInner {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn forward_connection_events(&self, events: Vec<ConnectionEvent>) {
        for event in events {
            self.send(match event {
                ConnectionEvent::Connected { handshake_ms } => {
                    SessionEvent::Connected { handshake_ms }
                }
                ConnectionEvent::Disconnected { reason } => SessionEvent::Disconnected { reason },
                ConnectionEvent::Reconnecting { attempt } => SessionEvent::Reconnecting { attempt },
                ConnectionEvent::Reconnected => SessionEvent::Reconnected,
                ConnectionEvent::ParticipantJoined { participant } => {
                    SessionEvent::ParticipantJoined { participant }
                }
                ConnectionEvent::ParticipantLeft { identity } => {
                    SessionEvent::ParticipantLeft { identity }
                }
                ConnectionEvent::AgentStateChanged { state } => {
                    SessionEvent::AgentStateChanged { state }
                }
                ConnectionEvent::MicrophonePaused => SessionEvent::MicrophonePaused,
                ConnectionEvent::MicrophoneResumed => SessionEvent::MicrophoneResumed,
                ConnectionEvent::Error { message } => SessionEvent::Error { message },
            });
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::AgentAudio { samples } => {
                self.playback.enqueue(&samples);
                self.tap.forward(Party::Agent, &samples);
            }
            TransportEvent::AudioLevel { party, level } => {
                self.analytics.observe_level(party, level, self.now_ms());
            }
            TransportEvent::QualityChanged { quality } => {
                self.analytics.observe_quality(quality);
            }
            TransportEvent::TrackSubscribed { track } => {
                self.tracks.insert(track.id.clone(), track.clone());
                self.analytics.track_subscribed();
                self.send(SessionEvent::TrackSubscribed { track });
            }
            TransportEvent::TrackUnsubscribed { track_id } => {
                self.tracks.remove(&track_id);
                self.analytics.track_unsubscribed();
                self.send(SessionEvent::TrackUnsubscribed { track_id });
            }
            TransportEvent::TrackMuteChanged { track_id, muted } => {
                if let Some(mut entry) = self.tracks.get_mut(&track_id) {
                    entry.muted = muted;
                }
                self.send(SessionEvent::TrackMuteChanged { track_id, muted });
            }
            TransportEvent::DataReceived { payload, sender } => {
                for event in classify_data(&payload, &sender) {
                    self.send(event);
                }
            }
            TransportEvent::Rpc(RpcRequest {
                method,
                payload,
                responder,
            }) => {
                let result = self.tools.dispatch(&method, &payload).await;
                self.send(SessionEvent::ToolInvoked {
                    name: method.clone(),
                });
                if responder.send(result).is_err() {
                    debug!(tool = %method, "rpc caller went away before the response");
                }
            }
            TransportEvent::Disconnected { .. } => {
                // Cleanup completes before the Disconnected event is
                // dispatched; listeners observe a system already reset.
                self.cleanup_subsystems();
                let events = self.connection.handle_transport_event(&event);
                self.started.store(false, Ordering::SeqCst);
                self.forward_connection_events(events);
            }
            ref other => {
                let events = self.connection.handle_transport_event(other);
                self.analytics.observe_connection(&self.connection.stats());
                self.forward_connection_events(events);
            }
        }
    }

    fn handle_playback_event(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Finished => self.send(SessionEvent::PlaybackFinished),
            PlaybackEvent::Mark { name } => self.send(SessionEvent::PlaybackMark { name }),
        }
    }

    fn handle_analytics_event(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::VoiceActivity { party, .. } => {
                self.send(SessionEvent::VoiceActivity { party });
                if party == Party::Agent {
                    self.send(SessionEvent::Speaking);
                }
            }
            AnalyticsEvent::SpeakingStopped { party, .. } => {
                if party == Party::Agent {
                    self.send(SessionEvent::Listening);
                }
            }
            AnalyticsEvent::Dropout { party, duration_ms } => {
                self.send(SessionEvent::AudioDropout { party, duration_ms });
            }
            AnalyticsEvent::QualityChanged { label } => {
                self.send(SessionEvent::QualityChanged { quality: label });
            }
            AnalyticsEvent::Snapshot { .. } => {
                // Recompute on dispatch so the snapshot reflects live
                // connection counters.
                self.analytics.observe_connection(&self.connection.stats());
                let metrics = self.analytics.snapshot();
                self.send(SessionEvent::MetricsSnapshot { metrics });
            }
        }
    }

    /// Cascade cleanup: analytics, then audio, then tools
    fn cleanup_subsystems(&self) {
        self.analytics.reset();
        self.playback.clear();
        self.tap.disable();
        self.stop_capture();
        self.stop_audio_output();
        self.tools.clear();
        self.tracks.clear();
    }

    fn pause_capture(&self) {
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.pause();
        }
    }

    fn resume_capture(&self) {
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.resume();
        }
    }

    fn stop_capture(&self) {
        if let Some(mut pipeline) = self.capture.lock().take() {
            pipeline.stop();
        }
        if let Some(task) = self.capture_task.lock().take() {
            task.abort();
        }
    }

    fn stop_audio_output(&self) {
        if let Some(mut sink) = self.output.lock().take() {
            sink.stop();
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
