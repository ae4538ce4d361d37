//! Runs a full session against the in-process mock transport and prints
//! every event on the unified stream.

use anyhow::Result;
use std::time::Duration;
use voxlink::{MockTransport, Party, Session, SessionConfig, TransportEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let transport = MockTransport::new();
    let config = SessionConfig::new("wss://voice.example.com", "demo-token");
    let (session, mut events) = Session::new(transport.clone(), config);

    session.start().await;
    println!("session {} started", session.id());

    // Simulate an agent joining and speaking for half a second.
    transport.push_event(TransportEvent::ParticipantConnected {
        identity: "agent".to_string(),
        metadata: String::new(),
    });
    for _ in 0..10 {
        transport.push_event(TransportEvent::AudioLevel {
            party: Party::Agent,
            level: 0.2,
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    transport.push_event(TransportEvent::AudioLevel {
        party: Party::Agent,
        level: 0.0,
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.end().await;

    while let Ok(Some(event)) = events.try_next() {
        println!("event: {}", event.event_type());
    }
    println!("final metrics: {:?}", session.metrics());
    Ok(())
}
