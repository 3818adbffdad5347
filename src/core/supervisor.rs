// src/core/supervisor.rs — Per-task envelope: open session, relay, end once
//
// Phases: Idle → SessionStarting → (SessionActive | SessionAbsent) → Relaying
// → Ending → Done. Ending is a no-op for SessionAbsent.
//
// The tracking session is held by a `TaskScope`. `finish` ends it; if the task
// future is dropped first (HTTP client gone mid-request), `Drop` ends it on a
// background task. An atomic flag makes sure only one of the two runs. Either
// way the end call itself runs as a spawned task, so dropping the future while
// `finish` awaits it cannot cancel the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use super::relay::{ContentFragment, ContentSink, StreamRelay, Termination};
use crate::runtime::{AgentRuntime, RuntimeError};
use crate::tracking::{SessionTracker, TrackingSession, UsageDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskShape {
    Duplex,
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Idle,
    SessionStarting,
    SessionActive,
    SessionAbsent,
    Relaying,
    Ending,
    Done,
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Completed,
    Disconnected,
    Faulted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task_id: String,
    /// Whether a tracking session was opened.
    pub tracked: bool,
    pub errors: u32,
    pub fragments: usize,
    pub heartbeats: usize,
    pub ended_by: EndCause,
    pub phase: TaskPhase,
    pub fault: Option<RuntimeError>,
}

impl TaskReport {
    /// Surface the runtime fault, if any, now that bookkeeping is complete.
    pub fn into_result(self) -> Result<TaskReport, RuntimeError> {
        match self.fault {
            Some(ref e) => Err(e.clone()),
            None => Ok(self),
        }
    }
}

/// Result of a one-shot task: the newline-joined response plus the report.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotOutcome {
    pub response: String,
    pub report: TaskReport,
}

#[derive(Clone)]
pub struct TaskSupervisor {
    runtime: Arc<dyn AgentRuntime>,
    tracker: Arc<dyn SessionTracker>,
    heartbeat_drain: Duration,
    /// Session-end tasks, shared by every clone.
    closing: TaskTracker,
}

impl TaskSupervisor {
    pub fn new(runtime: Arc<dyn AgentRuntime>, tracker: Arc<dyn SessionTracker>) -> Self {
        Self {
            runtime,
            tracker,
            heartbeat_drain: Duration::from_secs(2),
            closing: TaskTracker::new(),
        }
    }

    pub fn with_heartbeat_drain(mut self, grace: Duration) -> Self {
        self.heartbeat_drain = grace;
        self
    }

    pub fn root_agent(&self) -> &str {
        self.runtime.root_agent()
    }

    /// Wait up to `grace` for session ends still in flight, e.g. from tasks
    /// dropped during shutdown. Returns false if some were still running.
    pub async fn wait_for_session_ends(&self, grace: Duration) -> bool {
        self.closing.close();
        let done = tokio::time::timeout(grace, self.closing.wait())
            .await
            .is_ok();
        if !done {
            tracing::warn!(pending = self.closing.len(), "Session ends still in flight");
        }
        self.closing.reopen();
        done
    }

    /// Run a single message to completion, collecting all content.
    pub async fn run_one_shot(
        &self,
        task_id: &str,
        text: &str,
        description: Option<&str>,
    ) -> OneShotOutcome {
        let span = tracing::info_span!("task", task_id, shape = ?TaskShape::OneShot);
        async move {
            let mut scope = self.open(task_id, description).await;
            let mut relay = StreamRelay::new(
                self.tracker.clone(),
                scope.session.clone(),
                self.runtime.root_agent(),
            );
            let mut collected: Vec<ContentFragment> = Vec::new();
            let mut ended_by = EndCause::Completed;
            let mut fragments = 0;

            scope.advance(TaskPhase::Relaying);
            if scope.fault.is_none() {
                match self.start_run(&scope, text).await {
                    Ok(events) => {
                        let outcome = relay
                            .pump(events, &mut collected, &CancellationToken::new())
                            .await;
                        scope.errors += outcome.error_count;
                        fragments = outcome.fragments;
                        match outcome.termination {
                            Termination::Completed => {}
                            Termination::Disconnected => ended_by = EndCause::Disconnected,
                            Termination::Faulted(e) => scope.fault = Some(e),
                        }
                    }
                    Err(e) => {
                        scope.errors += 1;
                        scope.fault = Some(e);
                    }
                }
            }
            if scope.fault.is_some() {
                ended_by = EndCause::Faulted;
            }

            let heartbeats = relay.heartbeats();
            relay.drain(self.heartbeat_drain).await;
            let report = scope.finish(ended_by, fragments, heartbeats).await;

            let mut lines: Vec<String> = collected.into_iter().map(|f| f.content).collect();
            if let Some(ref e) = report.fault {
                lines.push(format!("Error: {e}"));
            }
            OneShotOutcome {
                response: lines.join("\n"),
                report,
            }
        }
        .instrument(span)
        .await
    }

    /// Run a long-lived conversation: each inbound message is relayed to `sink`
    /// until the caller disconnects (inbound closes or `cancel` fires) or the
    /// runtime faults.
    pub async fn run_duplex<K: ContentSink + ?Sized>(
        &self,
        task_id: &str,
        description: Option<&str>,
        inbound: &mut mpsc::Receiver<String>,
        sink: &mut K,
        cancel: CancellationToken,
    ) -> TaskReport {
        let span = tracing::info_span!("task", task_id, shape = ?TaskShape::Duplex);
        async move {
            let mut scope = self.open(task_id, description).await;
            let mut relay = StreamRelay::new(
                self.tracker.clone(),
                scope.session.clone(),
                self.runtime.root_agent(),
            );
            let mut fragments = 0;

            scope.advance(TaskPhase::Relaying);
            let ended_by = if scope.fault.is_some() {
                EndCause::Faulted
            } else {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        m = inbound.recv() => m,
                    };
                    let Some(message) = message else {
                        break EndCause::Disconnected;
                    };

                    let started = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break EndCause::Disconnected,
                        r = self.start_run(&scope, &message) => r,
                    };
                    let events = match started {
                        Ok(events) => events,
                        Err(e) => {
                            scope.errors += 1;
                            scope.fault = Some(e);
                            break EndCause::Faulted;
                        }
                    };

                    let outcome = relay.pump(events, &mut *sink, &cancel).await;
                    scope.errors += outcome.error_count;
                    fragments += outcome.fragments;
                    match outcome.termination {
                        Termination::Completed => continue,
                        Termination::Disconnected => break EndCause::Disconnected,
                        Termination::Faulted(e) => {
                            scope.fault = Some(e);
                            break EndCause::Faulted;
                        }
                    }
                }
            };

            let heartbeats = relay.heartbeats();
            relay.drain(self.heartbeat_drain).await;
            scope.finish(ended_by, fragments, heartbeats).await
        }
        .instrument(span)
        .await
    }

    /// Open the runtime conversation and the tracking session concurrently.
    async fn open(&self, task_id: &str, description: Option<&str>) -> TaskScope {
        let mut scope = TaskScope::new(
            task_id,
            self.tracker.clone(),
            self.runtime.clone(),
            self.closing.clone(),
        );
        scope.advance(TaskPhase::SessionStarting);

        let (context, session) = tokio::join!(
            self.runtime.create_session(&scope.user_id),
            self.tracker.start_session(task_id, description),
        );

        match session {
            Ok(session) => {
                scope.session = Some(session);
                scope.advance(TaskPhase::SessionActive);
            }
            Err(e) => {
                tracing::warn!("Tracking session not started, continuing untracked: {e}");
                scope.advance(TaskPhase::SessionAbsent);
            }
        }

        match context {
            Ok(id) => scope.runtime_session = Some(id),
            Err(e) => {
                tracing::error!("Failed to open conversation: {e}");
                scope.errors += 1;
                scope.fault = Some(e);
            }
        }
        scope
    }

    async fn start_run(
        &self,
        scope: &TaskScope,
        message: &str,
    ) -> Result<crate::runtime::EventStream, RuntimeError> {
        let session_id = scope
            .runtime_session
            .as_deref()
            .ok_or_else(|| RuntimeError::SessionNotFound { id: String::new() })?;
        self.runtime.run(&scope.user_id, session_id, message).await
    }
}

/// Scoped ownership of one task's tracking session and conversation context.
struct TaskScope {
    task_id: String,
    user_id: String,
    tracker: Arc<dyn SessionTracker>,
    runtime: Arc<dyn AgentRuntime>,
    closing: TaskTracker,
    session: Option<TrackingSession>,
    runtime_session: Option<String>,
    errors: u32,
    fault: Option<RuntimeError>,
    phase: TaskPhase,
    ended: AtomicBool,
}

impl TaskScope {
    fn new(
        task_id: &str,
        tracker: Arc<dyn SessionTracker>,
        runtime: Arc<dyn AgentRuntime>,
        closing: TaskTracker,
    ) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            task_id: task_id.to_string(),
            user_id: format!("user-{}", &hex[..8]),
            tracker,
            runtime,
            closing,
            session: None,
            runtime_session: None,
            errors: 0,
            fault: None,
            phase: TaskPhase::Idle,
            ended: AtomicBool::new(false),
        }
    }

    fn advance(&mut self, next: TaskPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "Task phase");
        self.phase = next;
    }

    /// End the tracking session (if any) with the accumulated error count.
    async fn finish(mut self, ended_by: EndCause, fragments: usize, heartbeats: usize) -> TaskReport {
        if !self.ended.swap(true, Ordering::SeqCst) {
            if self.session.is_some() {
                self.advance(TaskPhase::Ending);
            }
            let end = self.closing.spawn(close_out(
                self.tracker.clone(),
                self.runtime.clone(),
                self.session.clone(),
                self.runtime_session.take(),
                self.errors,
            ));
            if let Err(e) = end.await {
                tracing::error!(task_id = %self.task_id, "Session end task failed: {e}");
            }
        }
        self.advance(TaskPhase::Done);

        tracing::info!(
            ?ended_by,
            errors = self.errors,
            fragments,
            heartbeats,
            tracked = self.session.is_some(),
            "Task finished"
        );
        TaskReport {
            task_id: self.task_id.clone(),
            tracked: self.session.is_some(),
            errors: self.errors,
            fragments,
            heartbeats,
            ended_by,
            phase: self.phase,
            fault: self.fault.take(),
        }
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        tracing::warn!(task_id = %self.task_id, "Task dropped mid-flight; closing session in background");
        self.closing.spawn_on(
            close_out(
                self.tracker.clone(),
                self.runtime.clone(),
                self.session.take(),
                self.runtime_session.take(),
                self.errors,
            ),
            &handle,
        );
    }
}

/// The terminal step: end the tracking session, then drop the conversation.
async fn close_out(
    tracker: Arc<dyn SessionTracker>,
    runtime: Arc<dyn AgentRuntime>,
    session: Option<TrackingSession>,
    runtime_session: Option<String>,
    errors: u32,
) {
    if let Some(session) = session {
        let delta = UsageDelta {
            error_count: errors,
            ..UsageDelta::default()
        };
        tracker.end_session(&session, delta).await;
    }
    if let Some(id) = runtime_session {
        runtime.close_session(&id).await;
    }
}
