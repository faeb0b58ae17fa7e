//! Live progress bars fed by status cache events.

use std::collections::{HashMap, HashSet};

use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::trace;

use simcalc_core::observers::StatusEvent;
use simcalc_core::status::StatusKind;

/// Bar length; positions are tenths of a percent.
const BAR_LENGTH: u64 = 1_000;

fn bar_position(progress: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let position = (progress.clamp(0.0, 100.0) * 10.0).round() as u64;
    position
}

/// One progress bar per status key.
///
/// Events for a key that has already settled are ignored: cache
/// notifications may arrive out of order across writers.
pub struct ProgressDisplay {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<String, ProgressBar>,
    settled: HashSet<String>,
}

impl ProgressDisplay {
    /// Create a display; a hidden one tracks state without drawing.
    #[must_use]
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let style = ProgressStyle::with_template("{prefix:>14} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            bars: HashMap::new(),
            settled: HashSet::new(),
        }
    }

    fn bar(&mut self, key: &str) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(key.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(BAR_LENGTH));
            bar.set_style(style.clone());
            bar.set_prefix(key.to_string());
            bar
        })
    }

    /// Apply one event. Returns whether it changed the display.
    pub fn handle(&mut self, event: &StatusEvent) -> bool {
        if self.settled.contains(&event.key) {
            trace!(key = %event.key, "Ignoring event for settled key");
            return false;
        }
        let status = &event.status;
        let bar = self.bar(&event.key).clone();
        bar.set_position(bar_position(status.progress()));
        match status.status() {
            StatusKind::Computing => bar.set_message(status.message().to_string()),
            StatusKind::Ok => {
                bar.finish_with_message("done");
                self.settled.insert(event.key.clone());
            }
            StatusKind::Error => {
                bar.abandon_with_message(format!("failed: {}", status.message()));
                self.settled.insert(event.key.clone());
            }
        }
        true
    }

    /// Consume events until every sender is gone.
    #[must_use]
    pub fn run(mut self, events: &Receiver<StatusEvent>) -> Self {
        for event in events {
            self.handle(&event);
        }
        self
    }

    /// Current bar position for `key`, in tenths of a percent.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<u64> {
        self.bars.get(key).map(ProgressBar::position)
    }

    #[must_use]
    pub fn is_settled(&self, key: &str) -> bool {
        self.settled.contains(key)
    }

    /// Clear any bar still drawing.
    pub fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}
