//! Typed event bus.
//!
//! Components publish [`FactoryEvent`]s on a shared broadcast channel; the CLI
//! (or a test) subscribes and renders them. Publishing never fails: with no
//! subscribers the event is only logged.

pub mod build;
pub mod generation;
pub mod repo;
pub mod session;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use build::BuildEvent;
pub use generation::GenerationEvent;
pub use repo::RepoEvent;
pub use session::{AuthEvent, Provider};

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "lowercase")]
pub enum FactoryEvent {
    Auth(AuthEvent),
    Repo(RepoEvent),
    Build(BuildEvent),
    Generation(GenerationEvent),
}

impl FactoryEvent {
    /// Colon-separated event name, e.g. `repo:push:partial`.
    pub fn name(&self) -> &'static str {
        match self {
            FactoryEvent::Auth(e) => e.name(),
            FactoryEvent::Repo(e) => e.name(),
            FactoryEvent::Build(e) => e.name(),
            FactoryEvent::Generation(e) => e.name(),
        }
    }
}

impl From<AuthEvent> for FactoryEvent {
    fn from(e: AuthEvent) -> Self {
        FactoryEvent::Auth(e)
    }
}

impl From<RepoEvent> for FactoryEvent {
    fn from(e: RepoEvent) -> Self {
        FactoryEvent::Repo(e)
    }
}

impl From<BuildEvent> for FactoryEvent {
    fn from(e: BuildEvent) -> Self {
        FactoryEvent::Build(e)
    }
}

impl From<GenerationEvent> for FactoryEvent {
    fn from(e: GenerationEvent) -> Self {
        FactoryEvent::Generation(e)
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FactoryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: impl Into<FactoryEvent>) {
        let event = event.into();
        tracing::debug!(event = event.name(), "event");
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FactoryEvent> {
        self.tx.subscribe()
    }
}

/// Drain everything currently buffered on a receiver.
pub fn drain(rx: &mut broadcast::Receiver<FactoryEvent>) -> Vec<FactoryEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(e) => events.push(e),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}
