use log::info;

// Percentage of `done` over `total`, 100.0 for an empty total
pub fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 / total as f64 * 100.0
}

// True when `done` lands on a reporting boundary
pub fn is_checkpoint(done: usize, every: usize) -> bool {
    every != 0 && done != 0 && done % every == 0
}

// Progress line in the "count/total (pct%)" form
pub fn report_progress(stage: &str, done: usize, total: usize) {
    info!(
        "{}: {}/{} ({:.2}%)",
        stage,
        done,
        total,
        percent(done, total)
    );
}
