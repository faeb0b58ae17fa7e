//! Concrete subscriber implementations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::constants::PROGRESS_LOG_THRESHOLD;
use crate::observer::StatusSubscriber;
use crate::status::{CalcStatus, StatusKind};

/// One accepted cache write.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub key: String,
    pub status: CalcStatus,
}

/// How long a terminal write may wait for room in a full channel.
const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Subscriber that forwards writes through a channel.
///
/// Progress updates never block: on a full channel they are dropped, since
/// a later write supersedes them. A terminal write is the last one its key
/// gets, so it waits up to [`TERMINAL_SEND_TIMEOUT`] for the reader to make
/// room.
pub struct ChannelSubscriber {
    sender: Sender<StatusEvent>,
}

impl ChannelSubscriber {
    #[must_use]
    pub fn new(sender: Sender<StatusEvent>) -> Self {
        Self { sender }
    }
}

impl StatusSubscriber for ChannelSubscriber {
    fn on_status(&self, key: &str, status: &CalcStatus) {
        let event = StatusEvent {
            key: key.to_string(),
            status: status.clone(),
        };
        if !status.is_terminal() {
            let _ = self.sender.try_send(event);
        } else if let Err(SendTimeoutError::Timeout(_)) = self.sender.send_timeout(event, TERMINAL_SEND_TIMEOUT) {
            warn!(task_key = key, "Status channel full, terminal update not forwarded");
        }
    }
}

/// Subscriber that logs writes, throttled per key.
///
/// Progress is logged at most once per `min_interval` and only after it
/// moved by [`PROGRESS_LOG_THRESHOLD`] points. Terminal writes are always
/// logged.
pub struct LoggingSubscriber {
    min_interval: Duration,
    last: Mutex<HashMap<String, (f64, Instant)>>,
}

impl LoggingSubscriber {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    fn should_log(&self, key: &str, progress: f64) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match last.get(key) {
            Some(&(p, at))
                if now.duration_since(at) < self.min_interval
                    || (progress - p).abs() < PROGRESS_LOG_THRESHOLD =>
            {
                false
            }
            _ => {
                last.insert(key.to_string(), (progress, now));
                true
            }
        }
    }
}

impl StatusSubscriber for LoggingSubscriber {
    fn on_status(&self, key: &str, status: &CalcStatus) {
        match status.status() {
            StatusKind::Ok => {
                self.last.lock().remove(key);
                info!(key, job_id = %status.metadata().job_id, "Calculation complete");
            }
            StatusKind::Error => {
                self.last.lock().remove(key);
                let message = status.error().map_or("unknown error", |e| e.message.as_str());
                warn!(key, job_id = %status.metadata().job_id, error = message, "Calculation failed");
            }
            StatusKind::Computing => {
                if self.should_log(key, status.progress()) {
                    debug!(
                        key,
                        progress = status.progress(),
                        phase = status.message(),
                        "Progress update"
                    );
                }
            }
        }
    }
}

/// Null object pattern: ignores every write.
pub struct NoOpSubscriber;

impl StatusSubscriber for NoOpSubscriber {
    fn on_status(&self, _key: &str, _status: &CalcStatus) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CalculationFamily;
    use crate::status::{ProgressOverlay, StatusMetadata, TargetType, TaskOutcome};

    fn status(progress: f64) -> CalcStatus {
        let mut s = CalcStatus::computing(
            StatusMetadata::now("sim", CalculationFamily::Household, TargetType::Simulation, "r"),
            "",
        );
        s.apply_overlay(&ProgressOverlay::new(progress, "Running"));
        s
    }

    #[test]
    fn channel_subscriber_sends() {
        let (tx, rx) = crossbeam_channel::bounded(10);
        let sub = ChannelSubscriber::new(tx);
        sub.on_status("sim", &status(12.0));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "sim");
        assert!((event.status.progress() - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn channel_subscriber_full_channel_does_not_panic() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let sub = ChannelSubscriber::new(tx);
        sub.on_status("sim", &status(1.0));
        sub.on_status("sim", &status(2.0));
    }

    #[test]
    fn channel_subscriber_waits_to_deliver_terminal_status() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let sub = ChannelSubscriber::new(tx);
        sub.on_status("sim", &status(40.0));
        sub.on_status("sim", &status(60.0));

        let reader = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            rx.iter().take(2).collect::<Vec<_>>()
        });
        let mut done = status(60.0);
        done.settle(TaskOutcome::Ok(serde_json::json!({})));
        sub.on_status("sim", &done);

        let events = reader.join().unwrap();
        assert!((events[0].status.progress() - 40.0).abs() < f64::EPSILON);
        assert_eq!(events[1].status.status(), StatusKind::Ok);
    }

    #[test]
    fn logging_subscriber_throttles_small_deltas() {
        let sub = LoggingSubscriber::new(Duration::ZERO);
        assert!(sub.should_log("sim", 10.0));
        assert!(!sub.should_log("sim", 11.0));
        assert!(sub.should_log("sim", 16.0));
        assert!(sub.should_log("other", 11.0));
    }

    #[test]
    fn logging_subscriber_throttles_by_time() {
        let sub = LoggingSubscriber::new(Duration::from_secs(60));
        assert!(sub.should_log("sim", 10.0));
        assert!(!sub.should_log("sim", 90.0));
    }

    #[test]
    fn logging_subscriber_terminal_resets_key() {
        let sub = LoggingSubscriber::new(Duration::from_secs(60));
        sub.on_status("sim", &status(10.0));
        let mut done = status(10.0);
        done.settle(TaskOutcome::Ok(serde_json::json!({})));
        sub.on_status("sim", &done);
        assert!(sub.last.lock().get("sim").is_none());
    }

    #[test]
    fn noop_subscriber_does_nothing() {
        NoOpSubscriber.on_status("sim", &status(50.0));
    }
}
