mod common;

use common::strategies::*;
use common::{dlq_service, registry_with_clock};
use conductor_recovery::clock::Clock;
use conductor_recovery::dlq::{DlqFilter, TaskFailure};
use conductor_recovery::resilience::{CircuitBreakerConfig, CircuitState};
use proptest::prelude::*;
use serde_json::json;

/// Reference model of a single breaker, driven alongside the registry
#[derive(Debug)]
struct ModelBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: u32,
    successes: u32,
    now_ms: u64,
    retry_at_ms: Option<u64>,
}

impl ModelBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            now_ms: 0,
            retry_at_ms: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.successes = 0;
        self.retry_at_ms = Some(self.now_ms + self.config.timeout_ms);
    }

    fn apply(&mut self, op: BreakerOp) {
        match op {
            BreakerOp::Failure => {
                self.failures += 1;
                match self.state {
                    CircuitState::Closed if self.failures >= self.config.failure_threshold => {
                        self.open()
                    }
                    CircuitState::HalfOpen => self.open(),
                    _ => {}
                }
            }
            BreakerOp::Success => match self.state {
                CircuitState::Closed => self.failures = 0,
                CircuitState::HalfOpen => {
                    self.successes += 1;
                    if self.successes >= self.config.success_threshold {
                        self.state = CircuitState::Closed;
                        self.failures = 0;
                        self.successes = 0;
                        self.retry_at_ms = None;
                    }
                }
                CircuitState::Open => {}
            },
            BreakerOp::Advance(ms) => {
                self.now_ms += ms;
                if let (CircuitState::Open, Some(retry_at)) = (self.state, self.retry_at_ms) {
                    if self.now_ms >= retry_at {
                        self.state = CircuitState::HalfOpen;
                        self.failures = 0;
                        self.successes = 0;
                        self.retry_at_ms = None;
                    }
                }
            }
        }
    }
}

proptest! {
    /// Property: the registry follows the breaker transition rules for any call sequence
    #[test]
    fn breaker_matches_reference_model(
        config in breaker_config_strategy(),
        ops in breaker_ops_strategy(),
    ) {
        let (registry, clock) = registry_with_clock(CircuitBreakerConfig::default());
        registry.initialize("svc", Some(config)).unwrap();
        let mut model = ModelBreaker::new(config);

        for op in ops {
            let record = match op {
                BreakerOp::Failure => registry.record_failure("svc", Some("err")),
                BreakerOp::Success => registry.record_success("svc"),
                BreakerOp::Advance(ms) => {
                    clock.advance_ms(ms as i64);
                    registry.get_state("svc").unwrap()
                }
            };
            model.apply(op);

            prop_assert_eq!(record.state, model.state, "after {:?}", op);
            prop_assert_eq!(record.failure_count, model.failures);
            prop_assert_eq!(record.success_count, model.successes);
            prop_assert_eq!(record.next_retry_at.is_some(), record.state == CircuitState::Open);
            prop_assert_eq!(registry.is_available("svc"), record.state != CircuitState::Open);
        }
    }

    /// Property: counters always add up and thresholds bound the live counts
    #[test]
    fn breaker_counters_are_consistent(
        config in breaker_config_strategy(),
        ops in breaker_ops_strategy(),
    ) {
        let (registry, clock) = registry_with_clock(CircuitBreakerConfig::default());
        registry.initialize("svc", Some(config)).unwrap();

        for op in &ops {
            match op {
                BreakerOp::Failure => { registry.record_failure("svc", None); }
                BreakerOp::Success => { registry.record_success("svc"); }
                BreakerOp::Advance(ms) => clock.advance_ms(*ms as i64),
            }
            let record = registry.get_state("svc").unwrap();
            prop_assert_eq!(
                record.total_requests,
                record.successful_requests + record.failed_requests
            );
            match record.state {
                CircuitState::Closed => {
                    prop_assert!(record.failure_count < config.failure_threshold);
                    prop_assert_eq!(record.success_count, 0);
                }
                CircuitState::HalfOpen => {
                    prop_assert!(record.success_count < config.success_threshold);
                }
                CircuitState::Open => {}
            }
        }
    }

    /// Property: filters, ordering and retention cleanup hold for any queue contents
    #[test]
    fn dlq_filters_ordering_and_cleanup(seed in dlq_seed_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (service, clock) = dlq_service();
            let base = clock.now();

            for (task_id, retries, resolved, minutes_ago) in &seed {
                clock.set(base - chrono::Duration::minutes(*minutes_ago));
                let entry = service
                    .add_to_dlq(task_id, json!({}), TaskFailure::new("boom"), *retries)
                    .await
                    .unwrap();
                if *resolved {
                    service.resolve_dlq_entry(&entry.id, "done").await.unwrap();
                }
            }
            clock.set(base);

            let pending_expected = seed.iter().filter(|(_, _, resolved, _)| !resolved).count();
            let unresolved = service
                .get_dlq_entries(&DlqFilter::unresolved(), usize::MAX, 0)
                .await
                .unwrap();
            prop_assert_eq!(unresolved.len(), pending_expected);
            prop_assert!(unresolved.iter().all(|e| e.resolved_at.is_none()));

            let task_a = service
                .get_dlq_entries(&DlqFilter::for_task("task-a"), usize::MAX, 0)
                .await
                .unwrap();
            prop_assert!(task_a.iter().all(|e| e.task_id == "task-a"));
            prop_assert!(task_a.windows(2).all(|w| w[0].added_at >= w[1].added_at));

            // 3 days = 4320 minutes; resolved entries older than that are purged
            let purged_expected = seed
                .iter()
                .filter(|(_, _, resolved, minutes_ago)| *resolved && *minutes_ago > 4_320)
                .count();
            let purged = service.cleanup_dlq(3).await.unwrap();
            prop_assert_eq!(purged, purged_expected);
            prop_assert_eq!(
                service.get_pending_entries(usize::MAX).await.unwrap().len(),
                pending_expected
            );
            Ok::<(), TestCaseError>(())
        })?;
    }
}
