use std::sync::OnceLock;

use prometheus::{IntCounterVec, register_int_counter_vec};

static METRICS: OnceLock<ProducerMetrics> = OnceLock::new();

pub struct ProducerMetrics {
    pub appended: IntCounterVec,
    pub append_failures: IntCounterVec,
}

impl ProducerMetrics {
    pub fn get() -> &'static Self {
        METRICS.get_or_init(|| Self {
            appended: register_int_counter_vec!(
                "announcement_appended_total",
                "Announcements appended to a stream",
                &["uri", "operation"]
            )
            .unwrap(),
            append_failures: register_int_counter_vec!(
                "announcement_append_failures_total",
                "Announcements that could not be appended",
                &["uri", "operation"]
            )
            .unwrap(),
        })
    }
}
