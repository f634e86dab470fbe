use crate::context::TelemetryLabels;

pub fn record_counter(name: &'static str, value: u64, labels: &TelemetryLabels) {
    metrics::counter!(name, "scope_type" => labels.scope_type.clone()).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, labels: &TelemetryLabels) {
    metrics::histogram!(name, "scope_type" => labels.scope_type.clone()).record(value);
}

pub fn record_gauge(name: &'static str, value: i64, labels: &TelemetryLabels) {
    metrics::gauge!(name, "scope_type" => labels.scope_type.clone()).set(value as f64);
}
