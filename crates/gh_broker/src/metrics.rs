use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Histogram, IntCounterVec, IntGauge, IntGaugeVec,
};

pub static INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("gh_broker_inflight", "Inflight GitHub requests").expect("inflight metric")
});

pub static RATE_REMAINING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "gh_broker_rate_remaining",
        "Rate limit remaining per token",
        &["token"]
    )
    .expect("rate remaining")
});

pub static RATE_LIMIT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("gh_broker_rate_limit", "Rate limit per token", &["token"])
        .expect("rate limit")
});

pub static SLEEP_SECONDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_sleep_seconds_total",
        "Total sleep seconds per reason",
        &["reason"]
    )
    .expect("sleep seconds")
});

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_requests_total",
        "Requests by token and status class",
        &["token", "status"]
    )
    .expect("requests total")
});

pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_retries_total",
        "Retries by reason",
        &["reason"]
    )
    .expect("retries")
});

pub static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("gh_broker_latency_seconds", "GitHub request latency").expect("latency")
});
