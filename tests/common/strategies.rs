use conductor_recovery::resilience::CircuitBreakerConfig;
use proptest::prelude::*;

/// One call against a single breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerOp {
    Failure,
    Success,
    /// Advance the clock by this many milliseconds, then read the state
    Advance(u64),
}

/// Strategy for configs inside the validated ranges
pub fn breaker_config_strategy() -> impl Strategy<Value = CircuitBreakerConfig> {
    (1u32..=10, 1u32..=5, 1_000u64..=10_000).prop_map(
        |(failure_threshold, success_threshold, timeout_ms)| CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            timeout_ms,
            ..Default::default()
        },
    )
}

pub fn breaker_op_strategy() -> impl Strategy<Value = BreakerOp> {
    prop_oneof![
        3 => Just(BreakerOp::Failure),
        3 => Just(BreakerOp::Success),
        1 => (0u64..=15_000).prop_map(BreakerOp::Advance),
    ]
}

pub fn breaker_ops_strategy() -> impl Strategy<Value = Vec<BreakerOp>> {
    prop::collection::vec(breaker_op_strategy(), 1..60)
}

/// (task id, retry count, resolved, minutes ago) for seeding a DLQ
pub fn dlq_seed_strategy() -> impl Strategy<Value = Vec<(String, u32, bool, i64)>> {
    prop::collection::vec(
        (
            prop_oneof![Just("task-a"), Just("task-b"), Just("task-c")].prop_map(String::from),
            0u32..8,
            any::<bool>(),
            0i64..10_000,
        ),
        0..25,
    )
}
