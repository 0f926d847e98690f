use tracing::{debug, error, info};

use crate::split::SplitOutcome;

/// Reclaim the local artifacts of a fully uploaded job.
///
/// Best-effort: every deletion failure is logged on its own and never
/// stops the remaining deletions. Callers only invoke this after every
/// segment of the job uploaded; a failed job's remnants are deliberately
/// left for operator inspection.
pub fn cleanup(outcome: &SplitOutcome) {
    let SplitOutcome::Segmented {
        original,
        parts_dir,
        segments,
    } = outcome
    else {
        // Whole-file jobs have nothing left: the uploader already removed
        // the file when configured to
        debug!("No split artifacts to clean up");
        return;
    };

    let mut deleted = 0usize;
    for segment in segments {
        if !segment.path.exists() {
            continue;
        }
        match std::fs::remove_file(&segment.path) {
            Ok(()) => deleted += 1,
            Err(err) => error!("Failed to delete segment {}: {err}", segment.path.display()),
        }
    }
    debug!("Deleted {deleted} leftover segment file(s)");

    // A non-empty directory here means something else went wrong already;
    // not worth escalating
    let _ = std::fs::remove_dir(parts_dir);

    if original.exists() {
        match std::fs::remove_file(original) {
            Ok(()) => info!("Deleted original pre-split file {}", original.display()),
            Err(err) => error!(
                "Failed to delete original file {}: {err}",
                original.display()
            ),
        }
    }
}
