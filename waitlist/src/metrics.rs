//! Waitlist metric descriptions.

use metrics::{Unit, describe_counter, describe_histogram};

/// Describe the waitlist metrics and the runtime's own counters.
pub fn register_metrics() {
    waitlist_runtime::metrics::register_runtime_metrics();

    describe_counter!(
        "waitlist_admissions_total",
        "Admissions finished, labelled by outcome (completed, rejected, failed, timeout)"
    );
    describe_counter!(
        "waitlist_allocation_retries_total",
        "Event id allocations repeated after an identifier collision"
    );
    describe_counter!(
        "waitlist_code_consumption_failures_total",
        "Codes that could not be consumed after the registrant was persisted"
    );
    describe_counter!(
        "waitlist_deliveries_total",
        "Emails attempted, labelled by artifact kind and status"
    );
    describe_counter!(
        "waitlist_certificate_sweep_total",
        "Certificates processed by the admin sweep, labelled by status"
    );
    describe_histogram!(
        "waitlist_admission_duration_seconds",
        Unit::Seconds,
        "Time from submission to the end of the admission workflow"
    );
}
