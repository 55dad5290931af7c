//! Queue consumer loop
//!
//! `poll_once` is one iteration: receive up to `concurrency` messages, run the
//! action for each concurrently, delete the ones whose action succeeded.
//! `drive` repeats it while a continuation predicate allows, and `run` builds
//! the bounded or unbounded predicate from `max_iterations`. Each action runs
//! on its own task; a panicking action counts as a failed message and the
//! loop carries on.

use futures::future::join_all;
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::actions::{ActionError, MessageAction};
use crate::observability::Metrics;
use crate::queue::{MessageQueue, ReceivedMessage};

/// Where the consumer currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Polling,
    /// Running actions for this many messages
    Processing(usize),
    /// Stopped; no further polls
    Draining,
}

/// Outcome of one iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub poll_failed: bool,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

/// Totals over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub iterations: usize,
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    fn add(&mut self, report: &PollReport) {
        self.iterations += 1;
        self.received += report.received;
        self.succeeded += report.succeeded;
        self.failed += report.failed;
    }
}

/// Continuation predicate for a bounded run
///
/// Each empty poll spends one unit of `budget`; an empty poll with nothing
/// left stops the loop. A budget of 0 stops on the first empty poll.
pub fn bounded(budget: usize) -> impl FnMut(&PollReport) -> bool {
    let mut remaining = budget;
    move |report: &PollReport| {
        if !report.is_empty() {
            return true;
        }
        if remaining == 0 {
            return false;
        }
        remaining -= 1;
        true
    }
}

pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    queue_name: String,
    action: Arc<dyn MessageAction>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    state: Mutex<ConsumerState>,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        queue_name: impl Into<String>,
        action: Arc<dyn MessageAction>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            action,
            metrics,
            poll_interval: Duration::from_secs(1),
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    /// Pause after an empty poll
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConsumerState::Draining)
    }

    fn set_state(&self, next: ConsumerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// One receive/execute/delete iteration
    pub async fn poll_once(&self, concurrency: usize, visibility: Duration) -> PollReport {
        let mut report = PollReport::default();
        self.set_state(ConsumerState::Polling);

        let messages = match self
            .queue
            .receive(&self.queue_name, concurrency.max(1), visibility)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(queue = %self.queue_name, error = %e, "Poll failed");
                report.poll_failed = true;
                self.set_state(ConsumerState::Idle);
                return report;
            }
        };

        report.received = messages.len();
        if messages.is_empty() {
            self.set_state(ConsumerState::Idle);
            return report;
        }

        self.set_state(ConsumerState::Processing(messages.len()));
        let outcomes = join_all(messages.iter().map(|m| self.handle(m))).await;
        for ok in outcomes {
            if ok {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        self.set_state(ConsumerState::Idle);
        debug!(
            queue = %self.queue_name,
            received = report.received,
            failed = report.failed,
            "Iteration finished"
        );
        report
    }

    /// Run the action on its own task so a panic stays with the message
    async fn execute(&self, message: &ReceivedMessage) -> Result<(), ActionError> {
        let action = Arc::clone(&self.action);
        let owned = message.clone();
        match tokio::spawn(async move { action.execute(&owned).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_panic() => Err(ActionError::Panicked(
                panic_message(join_error.into_panic()),
            )),
            Err(_) => Err(ActionError::Panicked("task cancelled".to_string())),
        }
    }

    async fn handle(&self, message: &ReceivedMessage) -> bool {
        if let Err(e) = self.execute(message).await {
            warn!(
                queue = %self.queue_name,
                message_id = %message.id,
                receive_count = message.receive_count,
                error = %e,
                "Action failed, message left for redelivery"
            );
            self.metrics.message_failed();
            return false;
        }

        if let Err(e) = self
            .queue
            .delete(&self.queue_name, &message.receipt_handle)
            .await
        {
            // The action is idempotent; a redelivery repeats it harmlessly
            warn!(queue = %self.queue_name, message_id = %message.id, error = %e, "Delete failed");
        }
        true
    }

    /// Poll until `proceed` returns false
    pub async fn drive<P>(&self, concurrency: usize, visibility: Duration, mut proceed: P) -> RunSummary
    where
        P: FnMut(&PollReport) -> bool + Send,
    {
        let mut summary = RunSummary::default();
        loop {
            let report = self.poll_once(concurrency, visibility).await;
            summary.add(&report);

            if !proceed(&report) {
                break;
            }
            if report.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        self.set_state(ConsumerState::Draining);
        info!(
            queue = %self.queue_name,
            iterations = summary.iterations,
            received = summary.received,
            failed = summary.failed,
            "Consumer drained"
        );
        summary
    }

    /// Bounded when `max_iterations >= 0`, unbounded when negative
    pub async fn run(
        &self,
        concurrency: usize,
        visibility: Duration,
        max_iterations: i64,
    ) -> RunSummary {
        match usize::try_from(max_iterations) {
            Ok(budget) => self.drive(concurrency, visibility, bounded(budget)).await,
            Err(_) => self.drive(concurrency, visibility, |_| true).await,
        }
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
