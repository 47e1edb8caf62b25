use std::sync::OnceLock;

use prometheus::{IntCounterVec, register_int_counter_vec};

static METRICS: OnceLock<ConsumerMetrics> = OnceLock::new();

pub struct ConsumerMetrics {
    pub claimed: IntCounterVec,
    pub consumed: IntCounterVec,
    pub handler_failures: IntCounterVec,
    pub resolutions: IntCounterVec,
}

impl ConsumerMetrics {
    pub fn get() -> &'static Self {
        METRICS.get_or_init(|| Self {
            claimed: register_int_counter_vec!(
                "announcement_claimed_total",
                "Stale pending announcements reclaimed from other consumers",
                &["uri"]
            )
            .unwrap(),
            consumed: register_int_counter_vec!(
                "announcement_consumed_total",
                "Announcements dispatched to handlers",
                &["uri"]
            )
            .unwrap(),
            handler_failures: register_int_counter_vec!(
                "announcement_handler_failures_total",
                "Handler invocations that failed or timed out",
                &["uri", "operation"]
            )
            .unwrap(),
            resolutions: register_int_counter_vec!(
                "announcement_resolutions_total",
                "Acknowledgments and cancellations by cause",
                &["outcome", "cause", "uri"]
            )
            .unwrap(),
        })
    }
}
