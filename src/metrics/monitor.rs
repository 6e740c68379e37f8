//! Watches a detached background task for its terminal outcome
//!
//! The monitor only logs. It never stops the process or signals the
//! manager, and it has no exit condition of its own.

use std::time::Duration;

use tracing::{error, warn};

use super::outcome::OutcomeReceiver;

/// How often the outcome cell is polled
pub const POLL_INTERVAL: Duration = Duration::from_millis(400);

pub struct FailureMonitor {
    outcome: OutcomeReceiver,
    interval: Duration,
}

impl FailureMonitor {
    pub fn new(outcome: OutcomeReceiver) -> Self {
        Self {
            outcome,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check the outcome cell once without blocking. Returns true if a
    /// record was emitted.
    pub fn poll(&mut self) -> bool {
        match self.outcome.try_take() {
            Some(Err(e)) => {
                error!(subsystem = %self.outcome.task(), error = %e, "Background server failed");
                true
            }
            Some(Ok(())) => {
                warn!(subsystem = %self.outcome.task(), "Background server exited");
                true
            }
            None => false,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::time::sleep(self.interval).await;
            self.poll();
        }
    }

    /// Detach the polling loop; it is abandoned when the process exits.
    pub fn spawn(self) {
        tokio::spawn(self.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metrics::outcome::outcome_channel;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Records the level and `subsystem` field of every event
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<Mutex<Vec<(Level, Option<String>)>>>);

    struct SubsystemField(Option<String>);

    impl Visit for SubsystemField {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "subsystem" {
                self.0 = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: Subscriber> Layer<S> for CapturedEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut subsystem = SubsystemField(None);
            event.record(&mut subsystem);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), subsystem.0));
        }
    }

    #[test]
    fn test_error_is_logged_exactly_once() {
        let captured = CapturedEvents::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());

        tracing::subscriber::with_default(subscriber, || {
            let (reporter, receiver) = outcome_channel("metrics-server");
            let mut monitor = FailureMonitor::new(receiver);

            assert!(!monitor.poll());
            reporter.report(Err(Error::ServerError("address in use".into())));
            assert!(monitor.poll());
            assert!(!monitor.poll());
            assert!(!monitor.poll());
        });

        let events = captured.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![(Level::ERROR, Some("metrics-server".to_string()))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_keeps_running_after_failure() {
        let (reporter, receiver) = outcome_channel("metrics-server");
        let handle = tokio::spawn(FailureMonitor::new(receiver).run());

        reporter.report(Err(Error::TlsError("no certificate".into())));
        tokio::time::sleep(POLL_INTERVAL * 10).await;

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_tolerates_outcome_not_yet_produced() {
        let (reporter, receiver) = outcome_channel("metrics-server");
        let handle = tokio::spawn(FailureMonitor::new(receiver).run());

        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(!handle.is_finished());

        drop(reporter);
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
