// src/core/relay.rs — Pump runtime events to the caller, side-report usage
//
// Content goes to the sink in arrival order. Usage goes to the tracker as a
// detached heartbeat task; the pump never waits on it. Dropping the relay
// leaves in-flight heartbeats running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::runtime::{EventStream, RuntimeError, TokenUsage};
use crate::tracking::{SessionTracker, TrackingSession, UsageDelta};

/// One text fragment attributed to the agent that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentFragment {
    pub agent: String,
    pub content: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("caller disconnected")]
pub struct SinkClosed;

/// Where forwarded content goes. An error means the caller is gone.
#[async_trait]
pub trait ContentSink: Send {
    async fn send(&mut self, fragment: ContentFragment) -> Result<(), SinkClosed>;
}

#[async_trait]
impl ContentSink for Vec<ContentFragment> {
    async fn send(&mut self, fragment: ContentFragment) -> Result<(), SinkClosed> {
        self.push(fragment);
        Ok(())
    }
}

#[async_trait]
impl ContentSink for mpsc::Sender<ContentFragment> {
    async fn send(&mut self, fragment: ContentFragment) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, fragment).await.map_err(|_| SinkClosed)
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The runtime's event stream ended.
    Completed,
    /// Cancellation fired or the sink closed.
    Disconnected,
    /// The runtime raised while producing the next event.
    Faulted(RuntimeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayOutcome {
    pub termination: Termination,
    pub error_count: u32,
    pub fragments: usize,
}

pub struct StreamRelay {
    tracker: Arc<dyn SessionTracker>,
    session: Option<TrackingSession>,
    root_agent: String,
    /// Handles only; dropping one detaches the task.
    in_flight: Vec<JoinHandle<()>>,
    heartbeats: usize,
}

impl StreamRelay {
    /// `session` is `None` when tracking could not be started; usage is then dropped.
    pub fn new(
        tracker: Arc<dyn SessionTracker>,
        session: Option<TrackingSession>,
        root_agent: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            session,
            root_agent: root_agent.into(),
            in_flight: Vec::new(),
            heartbeats: 0,
        }
    }

    /// Heartbeats dispatched so far.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats
    }

    /// Relay one event stream until it ends, faults, or the caller goes away.
    pub async fn pump<K: ContentSink + ?Sized>(
        &mut self,
        mut events: EventStream,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> RelayOutcome {
        let mut error_count = 0;
        let mut fragments = 0;

        let termination = 'relay: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'relay Termination::Disconnected,
                next = events.next() => next,
            };

            let event = match next {
                None => break 'relay Termination::Completed,
                Some(Err(e)) => {
                    error_count += 1;
                    tracing::warn!("Agent runtime fault: {e}");
                    break 'relay Termination::Faulted(e);
                }
                Some(Ok(event)) => event,
            };

            if let Some(usage) = event.usage {
                self.dispatch_heartbeat(usage);
            }

            let agent = event.author.unwrap_or_else(|| self.root_agent.clone());
            for content in event.texts {
                if content.is_empty() {
                    continue;
                }
                let fragment = ContentFragment {
                    agent: agent.clone(),
                    content,
                };
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SinkClosed),
                    sent = sink.send(fragment) => sent,
                };
                if sent.is_err() {
                    break 'relay Termination::Disconnected;
                }
                fragments += 1;
            }
        };

        tracing::debug!(
            ?termination,
            error_count,
            fragments,
            heartbeats = self.heartbeats,
            "Relay finished"
        );
        RelayOutcome {
            termination,
            error_count,
            fragments,
        }
    }

    fn dispatch_heartbeat(&mut self, usage: TokenUsage) {
        let Some(session) = self.session.clone() else {
            return;
        };

        // Reap finished heartbeats so long conversations don't accumulate handles
        self.in_flight.retain(|h| !h.is_finished());

        let tracker = self.tracker.clone();
        let delta = UsageDelta::tokens(usage.input_tokens, usage.output_tokens);
        self.in_flight.push(tokio::spawn(async move {
            tracker.heartbeat(&session, delta).await;
        }));
        self.heartbeats += 1;
    }

    /// Wait up to `grace` for in-flight heartbeats. Stragglers keep running detached.
    pub async fn drain(self, grace: Duration) {
        if self.in_flight.is_empty() {
            return;
        }
        let pending = self.in_flight.len();
        let wait_all = futures::future::join_all(self.in_flight);
        if tokio::time::timeout(grace, wait_all).await.is_err() {
            tracing::debug!(pending, "Heartbeats still in flight; detaching");
        }
    }
}
