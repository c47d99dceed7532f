//! Metrics recording for scans
//!
//! Goes through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use metrics::{counter, histogram};

/// Record one transient container query
pub fn record_container_query(driver: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("driver", driver.to_string()),
        ("status", if success { "success" } else { "failure" }.to_string()),
    ];

    counter!("container_queries_total", &labels).increment(1);
    histogram!("container_query_duration_seconds", &labels).record(duration_secs);
}

/// Record how many pins ended in a given status
pub fn record_pin_results(status: &str, count: usize) {
    let labels = [("status", status.to_string())];
    counter!("pinned_packages_total", &labels).increment(count as u64);
}

/// Record a stage that was skipped because it pins nothing
pub fn record_stage_skipped() {
    counter!("stages_skipped_total").increment(1);
}
