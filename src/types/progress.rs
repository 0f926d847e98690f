use std::time::{Duration, Instant};

/// One structured progress event for an in-flight transfer.
///
/// `bytes_total == 0` means the total is unknown (e.g. a response without
/// a Content-Length header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Width of the textual progress bar, in cells
const BAR_WIDTH: usize = 10;

/// Minimum delay between two progress reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(6);

/// Render a fixed-width proportional bar, e.g. `████░░░░░░`
pub fn render_bar(bytes_done: u64, bytes_total: u64, width: usize) -> String {
    let filled = if bytes_total > 0 {
        (width as u64 * bytes_done.min(bytes_total) / bytes_total) as usize
    } else {
        0
    };
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(width - filled));
    bar
}

/// Per-transfer bookkeeping: throttles reports and formats a status line
/// with percent, speed and ETA computed from cumulative bytes.
///
/// Callers decide *when* to consult the throttle; the first report is
/// always allowed and a final state can bypass it entirely.
#[derive(Debug)]
pub struct TransferTracker {
    started_at: Instant,
    last_report_at: Option<Instant>,
    interval: Duration,
}

impl TransferTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            last_report_at: None,
            interval,
        }
    }

    /// Whether a report should be emitted now. Marks the report as done
    /// when answering yes.
    pub fn should_report(&mut self) -> bool {
        self.should_report_at(Instant::now())
    }

    fn should_report_at(&mut self, now: Instant) -> bool {
        match self.last_report_at {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_report_at = Some(now);
                true
            }
        }
    }

    /// Format a one-line status for the given progress state
    pub fn describe(&self, progress: &Progress) -> String {
        let Progress {
            bytes_done,
            bytes_total,
        } = *progress;

        let percent = if bytes_total > 0 {
            format!("{:.1}%", bytes_done as f64 / bytes_total as f64 * 100.0)
        } else {
            "??%".to_string()
        };

        let elapsed = self.started_at.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            bytes_done as f64 / elapsed
        } else {
            0.0
        };
        let speed_str = if speed > 0.0 {
            format!("{:.2}MB/s", speed / 1024.0 / 1024.0)
        } else {
            "N/A".to_string()
        };

        let eta = if bytes_total > 0 && speed > 0.0 {
            let secs = (bytes_total.saturating_sub(bytes_done)) as f64 / speed;
            format_hms(secs as u64)
        } else {
            "N/A".to_string()
        };

        let size = if bytes_total > 0 {
            format!(
                "{:.1}MB / {:.1}MB",
                bytes_done as f64 / 1024.0 / 1024.0,
                bytes_total as f64 / 1024.0 / 1024.0
            )
        } else {
            format!("{:.1}MB", bytes_done as f64 / 1024.0 / 1024.0)
        };

        format!(
            "[{}] {percent} {size} Speed: {speed_str} | ETA: {eta}",
            render_bar(bytes_done, bytes_total, BAR_WIDTH)
        )
    }
}

fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
