//! Prometheus metrics for the USDC agent
//!
//! Exposed on the `/metrics` endpoint of `serve`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec, CounterVec,
    Gauge, Histogram, HistogramVec,
};

lazy_static! {
    // Bridge state machine
    pub static ref STATE_TRANSITIONS: CounterVec = register_counter_vec!(
        "cctp_state_transitions_total",
        "Bridge transfer state transitions",
        &["from", "to"]
    ).unwrap();

    pub static ref FAILURES: CounterVec = register_counter_vec!(
        "cctp_transfer_failures_total",
        "Bridge transfers that ended in failed, by reason",
        &["kind", "funds_burned"]
    ).unwrap();

    pub static ref ACTIVE_TRANSFERS: Gauge = register_gauge!(
        "cctp_active_transfers",
        "Bridge transfers currently being driven by this process"
    ).unwrap();

    // Attestation service
    pub static ref ATTESTATION_REQUESTS: CounterVec = register_counter_vec!(
        "cctp_attestation_requests_total",
        "Attestation service requests by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref ATTESTATION_WAIT: Histogram = register_histogram!(
        "cctp_attestation_wait_seconds",
        "Time from first poll to a complete attestation",
        vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]
    ).unwrap();

    // Ledger clients
    pub static ref LEDGER_ERRORS: CounterVec = register_counter_vec!(
        "ledger_errors_total",
        "Ledger client errors",
        &["chain", "kind"]
    ).unwrap();

    pub static ref LEDGER_WRITES: CounterVec = register_counter_vec!(
        "ledger_writes_total",
        "Transactions submitted by the agent",
        &["chain", "action"]
    ).unwrap();

    // Command surface
    pub static ref COMMAND_LATENCY: HistogramVec = register_histogram_vec!(
        "agent_command_duration_seconds",
        "Command execution time",
        &["command", "outcome"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]
    ).unwrap();
}

/// Record a bridge state transition
pub fn record_transition(from: &str, to: &str) {
    STATE_TRANSITIONS.with_label_values(&[from, to]).inc();
}

/// Record a transfer reaching `failed`
pub fn record_failure(kind: &str, funds_burned: bool) {
    let burned = if funds_burned { "true" } else { "false" };
    FAILURES.with_label_values(&[kind, burned]).inc();
}

pub fn record_attestation_request(outcome: &str) {
    ATTESTATION_REQUESTS.with_label_values(&[outcome]).inc();
}

pub fn record_attestation_wait(seconds: f64) {
    ATTESTATION_WAIT.observe(seconds);
}

/// Record a ledger client error
pub fn record_ledger_error(chain: &str, kind: &str) {
    LEDGER_ERRORS.with_label_values(&[chain, kind]).inc();
}

pub fn record_ledger_write(chain: &str, action: &str) {
    LEDGER_WRITES.with_label_values(&[chain, action]).inc();
}

/// Record a command's duration
pub fn record_command(command: &str, success: bool, seconds: f64) {
    let outcome = if success { "success" } else { "failure" };
    COMMAND_LATENCY
        .with_label_values(&[command, outcome])
        .observe(seconds);
}
