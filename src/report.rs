use tracing::{error, info};

use crate::types::{Progress, TransferTracker, REPORT_INTERVAL};

/// Live handle for one in-flight transfer.
///
/// The pipeline only pushes structured events through this; formatting,
/// throttling and delivery are the implementation's concern. None of these
/// methods may fail: a broken status channel must never abort the transfer
/// it merely describes.
pub trait ProgressHandle: Send {
    fn report(&mut self, progress: Progress);

    fn done(&mut self, note: &str);

    fn failed(&mut self, reason: &str);
}

/// Status stream back to the operator.
///
/// Implementations swallow their own delivery errors.
pub trait Reporter: Sync {
    /// Emit one free-text status line
    fn line(&self, text: &str);

    /// Open a progress handle for a transfer labelled `label`
    fn transfer(&self, label: &str) -> Box<dyn ProgressHandle>;
}

/// Reporter that writes status lines to the log
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn line(&self, text: &str) {
        info!("{text}");
    }

    fn transfer(&self, label: &str) -> Box<dyn ProgressHandle> {
        Box::new(ConsoleTransfer {
            label: label.to_string(),
            tracker: TransferTracker::new(REPORT_INTERVAL),
        })
    }
}

struct ConsoleTransfer {
    label: String,
    tracker: TransferTracker,
}

impl ProgressHandle for ConsoleTransfer {
    fn report(&mut self, progress: Progress) {
        if self.tracker.should_report() {
            info!("{} {}", self.label, self.tracker.describe(&progress));
        }
    }

    fn done(&mut self, note: &str) {
        // Final state bypasses the throttle
        info!("{} {note}", self.label);
    }

    fn failed(&mut self, reason: &str) {
        error!("{} {reason}", self.label);
    }
}
