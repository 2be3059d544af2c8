//! Notification sink contract.
//!
//! Delivery transport (push service, chat webhook, mail) is site glue and
//! lives outside this crate; the engine only needs somewhere to report the
//! terminal solve outcome. Delivery failure is logged and never fails the
//! solving task.

use crate::error::Result;

/// Accepts (title, body) notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Default sink: writes the notification to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        tracing::info!(title, body, "notification");
        Ok(())
    }
}

/// Send through a sink, swallowing and logging delivery failures.
pub fn send(notifier: &dyn Notifier, title: &str, body: &str) {
    if let Err(e) = notifier.notify(title, body) {
        tracing::error!(title, error = %e, "notification delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TuringError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        calls: AtomicUsize,
    }

    impl Notifier for FailingSink {
        fn notify(&self, _title: &str, _body: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TuringError::Driver("sink offline".into()))
        }
    }

    #[test]
    fn send_swallows_delivery_failure() {
        let sink = FailingSink {
            calls: AtomicUsize::new(0),
        };
        send(&sink, "title", "body");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn log_notifier_accepts() {
        assert!(LogNotifier.notify("t", "b").is_ok());
    }
}
