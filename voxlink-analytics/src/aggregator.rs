//! Call analytics aggregation
//!
//! One [`AnalyticsAggregator`] per session. Audio levels, quality
//! reports and connection counters are fed in by the session event
//! pump; derived events stream out over an unbounded channel. All audio
//! observations carry explicit timestamps so the aggregation itself is
//! deterministic and clock-free.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use voxlink_core::{ConnectionStats, Party, TransportQuality};

use crate::activity::{DropoutConfig, DropoutDetector, VadConfig, VadDetector, VadTransition};
use crate::metrics::{EstimatedMetrics, QualityLabel, VerifiedMetrics};

/// Analytics parameters
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Voice activity detection parameters
    pub vad: VadConfig,
    /// Dropout detection parameters
    pub dropout: DropoutConfig,
    /// Interval between periodic metric snapshots
    pub report_interval: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            dropout: DropoutConfig::default(),
            report_interval: Duration::from_millis(5000),
        }
    }
}

/// Events derived from the observed audio and connection state
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    /// A qualified speech run began
    VoiceActivity {
        /// Who is speaking
        party: Party,
        /// Timestamp at which the run started
        at_ms: u64,
    },
    /// A reported speech run ended
    SpeakingStopped {
        /// Who stopped speaking
        party: Party,
        /// Length of the run in milliseconds
        duration_ms: u64,
    },
    /// An audio dropout was confirmed
    Dropout {
        /// Whose audio dropped
        party: Party,
        /// Measured silence duration in milliseconds
        duration_ms: u64,
    },
    /// The connection quality label changed
    QualityChanged {
        /// New quality label
        label: QualityLabel,
    },
    /// Periodic metrics snapshot
    Snapshot {
        /// Metrics at the time of the snapshot
        metrics: VerifiedMetrics,
    },
}

struct PartyState {
    vad: VadDetector,
    dropout: DropoutDetector,
    speaking_ms: u64,
}

impl PartyState {
    fn new(config: &AnalyticsConfig) -> Self {
        Self {
            vad: VadDetector::new(config.vad.clone()),
            dropout: DropoutDetector::new(config.dropout.clone()),
            speaking_ms: 0,
        }
    }
}

struct Inner {
    parties: HashMap<Party, PartyState>,
    quality: QualityLabel,
    last_user_speech_start: Option<u64>,
    response_time_ms: Option<u64>,
    vad_events: u32,
    dropout_count: u32,
    track_count: usize,
    connection: Option<ConnectionStats>,
}

impl Inner {
    fn new(config: &AnalyticsConfig) -> Self {
        let mut parties = HashMap::new();
        parties.insert(Party::User, PartyState::new(config));
        parties.insert(Party::Agent, PartyState::new(config));
        Self {
            parties,
            quality: QualityLabel::Unknown,
            last_user_speech_start: None,
            response_time_ms: None,
            vad_events: 0,
            dropout_count: 0,
            track_count: 0,
            connection: None,
        }
    }

    fn snapshot(&self) -> VerifiedMetrics {
        let user_speaking_ms = self
            .parties
            .get(&Party::User)
            .map(|p| p.speaking_ms)
            .unwrap_or(0);
        let agent_speaking_ms = self
            .parties
            .get(&Party::Agent)
            .map(|p| p.speaking_ms)
            .unwrap_or(0);
        let (attempts, reconnects, duration, participants) = match &self.connection {
            Some(stats) => (
                stats.attempt_count,
                stats.reconnect_count,
                stats.call_duration_ms,
                stats.participant_count,
            ),
            None => (0, 0, None, 0),
        };
        VerifiedMetrics {
            connection_quality: self.quality,
            connect_attempts: attempts,
            reconnect_count: reconnects,
            call_duration_ms: duration,
            response_time_ms: self.response_time_ms,
            user_speaking_ms,
            agent_speaking_ms,
            dropout_count: self.dropout_count,
            vad_events: self.vad_events,
            participant_count: participants,
            track_count: self.track_count,
        }
    }
}

/// Aggregates per-session analytics and emits derived events
pub struct AnalyticsAggregator {
    config: AnalyticsConfig,
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<AnalyticsEvent>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsAggregator {
    /// Create an aggregator and the receiving end of its event stream
    pub fn new(config: AnalyticsConfig) -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(Inner::new(&config)));
        (
            Self {
                config,
                inner,
                events: tx,
                reporter: Mutex::new(None),
            },
            rx,
        )
    }

    /// Feed one audio level sample for a party
    ///
    /// `now_ms` is milliseconds from any fixed origin; only differences
    /// matter. Runs the party's voice-activity and dropout detectors and
    /// updates the response-time measurement.
    pub fn observe_level(&self, party: Party, level: f32, now_ms: u64) {
        let mut inner = self.inner.lock();
        let (transition, dropped) = match inner.parties.get_mut(&party) {
            Some(state) => (
                state.vad.process(level, now_ms),
                state.dropout.process(level, now_ms),
            ),
            None => return,
        };

        match transition {
            Some(VadTransition::Started { at_ms }) => {
                inner.vad_events += 1;
                match party {
                    Party::User => {
                        inner.last_user_speech_start = Some(at_ms);
                    }
                    Party::Agent => {
                        // Response time is agent speech start relative to
                        // the most recent user speech start; each user
                        // turn is answered at most once.
                        if let Some(user_start) = inner.last_user_speech_start.take() {
                            inner.response_time_ms = Some(at_ms.saturating_sub(user_start));
                        }
                    }
                }
                let _ = self.events.send(AnalyticsEvent::VoiceActivity { party, at_ms });
            }
            Some(VadTransition::Stopped { duration_ms }) => {
                if let Some(state) = inner.parties.get_mut(&party) {
                    state.speaking_ms += duration_ms;
                }
                let _ = self
                    .events
                    .send(AnalyticsEvent::SpeakingStopped { party, duration_ms });
            }
            None => {}
        }

        if let Some(duration_ms) = dropped {
            inner.dropout_count += 1;
            debug!(?party, duration_ms, "audio dropout confirmed");
            let _ = self.events.send(AnalyticsEvent::Dropout { party, duration_ms });
        }
    }

    /// Record a transport quality report
    ///
    /// Emits [`AnalyticsEvent::QualityChanged`] only when the label
    /// actually changes.
    pub fn observe_quality(&self, quality: TransportQuality) {
        let label = QualityLabel::from(quality);
        let mut inner = self.inner.lock();
        if inner.quality != label {
            inner.quality = label;
            let _ = self.events.send(AnalyticsEvent::QualityChanged { label });
        }
    }

    /// Record the latest connection counters
    pub fn observe_connection(&self, stats: &ConnectionStats) {
        self.inner.lock().connection = Some(stats.clone());
    }

    /// Record a track subscription
    pub fn track_subscribed(&self) {
        self.inner.lock().track_count += 1;
    }

    /// Record a track unsubscription
    pub fn track_unsubscribed(&self) {
        let mut inner = self.inner.lock();
        inner.track_count = inner.track_count.saturating_sub(1);
    }

    /// Current verified metrics
    pub fn snapshot(&self) -> VerifiedMetrics {
        self.inner.lock().snapshot()
    }

    /// Network estimates derived from the current quality label
    ///
    /// Proxy values, not measurements; kept off the verified snapshot
    /// deliberately.
    pub fn estimated(&self) -> EstimatedMetrics {
        EstimatedMetrics::from_label(self.inner.lock().quality)
    }

    /// Start emitting periodic [`AnalyticsEvent::Snapshot`] events
    ///
    /// Restarting replaces any running reporter.
    pub fn start_reporting(&self) {
        let mut guard = self.reporter.lock();
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let interval = self.config.report_interval;
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let metrics = inner.lock().snapshot();
                if events.send(AnalyticsEvent::Snapshot { metrics }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop the periodic reporter; safe to call when not running
    pub fn stop_reporting(&self) {
        if let Some(handle) = self.reporter.lock().take() {
            handle.abort();
        }
    }

    /// Discard all accumulated state and stop reporting
    pub fn reset(&self) {
        self.stop_reporting();
        *self.inner.lock() = Inner::new(&self.config);
    }
}

impl Drop for AnalyticsAggregator {
    fn drop(&mut self) {
        self.stop_reporting();
    }
}
