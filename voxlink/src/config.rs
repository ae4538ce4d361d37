//! Session configuration

use voxlink_analytics::AnalyticsConfig;
use voxlink_core::AGENT_STATE_ATTRIBUTE;
use voxlink_media::CaptureConfig;

use crate::tools::ToolDefinition;

/// Configuration for one voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint URL for the transport handshake
    pub url: String,
    /// Access token for the session
    pub token: String,
    /// Participant attribute key carrying the agent's conversational state
    pub agent_state_key: String,
    /// Analytics parameters
    pub analytics: AnalyticsConfig,
    /// Microphone capture parameters
    pub capture: CaptureConfig,
    /// Tools exposed to the remote agent
    pub tools: Vec<ToolDefinition>,
}

impl SessionConfig {
    /// Create a config for the given endpoint and token with defaults
    /// for everything else
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            agent_state_key: AGENT_STATE_ATTRIBUTE.to_string(),
            analytics: AnalyticsConfig::default(),
            capture: CaptureConfig::default(),
            tools: Vec::new(),
        }
    }

    /// Set the tools exposed to the remote agent
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Override the analytics parameters
    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }
}
