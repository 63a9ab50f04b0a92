//! Read fallback and write pass-through behaviour of the service facade.

mod common;

use common::{breaker_config, task, task_request, user, Failure, Harness};
use resilient_gateway::{
    breaker::CircuitState,
    model::{ResourceKind, Task},
    settings::CircuitBreakerConfig,
    ServiceError, UpstreamError,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_test::traced_test;

fn sorted_titles(tasks: Vec<Task>) -> Vec<String> {
    let mut titles: Vec<String> = tasks.into_iter().map(|t| t.task_title).collect();
    titles.sort();
    titles
}

#[tokio::test]
#[traced_test]
async fn test_get_by_id_success_populates_cache() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A")]);

    let fetched = harness.gateway.tasks.get_by_id(1).await.unwrap();

    assert_eq!(fetched, task(1, "A"));
    assert_eq!(harness.gateway.tasks.cache().get(1), Some(task(1, "A")));
}

#[tokio::test]
#[traced_test]
async fn test_list_success_caches_every_entity() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A"), task(2, "B"), task(3, "C")]);

    let listed = harness.gateway.tasks.list().await.unwrap();
    assert_eq!(listed.len(), 3);

    let cache = harness.gateway.tasks.cache();
    for entity in &listed {
        assert_eq!(cache.get(entity.task_id).as_ref(), Some(entity));
    }
}

#[tokio::test]
#[traced_test]
async fn test_open_circuit_serves_cached_entity_without_upstream_call() {
    let harness = Harness::new();
    harness.gateway.tasks.cache().put(1, task(1, "A"));
    harness.open_task_circuit();

    let fetched = harness.gateway.tasks.get_by_id(1).await.unwrap();
    assert_eq!(fetched, task(1, "A"));

    let missing = harness.gateway.tasks.get_by_id(2).await;
    assert!(matches!(
        missing,
        Err(ServiceError::FallbackUnavailable {
            resource: ResourceKind::Task,
            id: Some(2)
        })
    ));

    assert_eq!(harness.tasks.calls.reads(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_open_circuit_with_empty_cache_fails_list() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A")]);
    harness.open_task_circuit();

    let result = harness.gateway.tasks.list().await;

    assert!(matches!(
        result,
        Err(ServiceError::FallbackUnavailable { id: None, .. })
    ));
    assert_eq!(harness.tasks.calls.list.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[traced_test]
async fn test_open_circuit_list_returns_cache_regardless_of_upstream() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "fresh"), task(7, "upstream only")]);
    harness
        .gateway
        .tasks
        .cache()
        .put_all(&[task(1, "stale"), task(2, "B")]);
    harness.open_task_circuit();

    let listed = harness.gateway.tasks.list().await.unwrap();

    assert_eq!(sorted_titles(listed), vec!["B", "stale"]);
    assert_eq!(harness.tasks.calls.reads(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_trip_worthy_list_failure_falls_back_and_records_failure() {
    let harness = Harness::new();
    harness
        .gateway
        .tasks
        .cache()
        .put_all(&[task(1, "A"), task(2, "B")]);
    harness.tasks.fail_with(Failure::ServerError);

    let listed = harness.gateway.tasks.list().await.unwrap();
    assert_eq!(sorted_titles(listed), vec!["A", "B"]);

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    let metrics = breaker.metrics();
    assert_eq!(metrics.failure_count, 1);
    assert_eq!(metrics.consecutive_failures, 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
#[traced_test]
async fn test_trip_worthy_get_failure_without_cache_is_unavailable() {
    let harness = Harness::new();
    harness.tasks.fail_with(Failure::Timeout);

    let result = harness.gateway.tasks.get_by_id(5).await;

    assert!(matches!(
        result,
        Err(ServiceError::FallbackUnavailable { id: Some(5), .. })
    ));
}

#[tokio::test]
#[traced_test]
async fn test_non_trip_worthy_failure_propagates_without_cache() {
    let harness = Harness::new();
    harness.gateway.tasks.cache().put(1, task(1, "A"));
    harness.tasks.fail_with(Failure::BadRequest);

    let result = harness.gateway.tasks.get_by_id(1).await;
    assert!(matches!(
        result,
        Err(ServiceError::Upstream(UpstreamError::Status { status: 400, .. }))
    ));

    let result = harness.gateway.tasks.list().await;
    assert!(matches!(result, Err(ServiceError::Upstream(_))));

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.metrics().failure_count, 0);
    assert_eq!(breaker.metrics().ignored_count, 2);
}

#[tokio::test]
#[traced_test]
async fn test_not_found_propagates_and_never_falls_back() {
    let harness = Harness::new();
    // Cached but gone upstream: not-found is authoritative
    harness.gateway.tasks.cache().put(9, task(9, "ghost"));

    let result = harness.gateway.tasks.get_by_id(9).await;

    assert!(matches!(
        result,
        Err(ServiceError::NotFound {
            resource: ResourceKind::Task
        })
    ));
    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.metrics().failure_count, 0);
}

#[tokio::test]
#[traced_test]
async fn test_repeated_failures_open_circuit_and_stop_upstream_calls() {
    let harness = Harness::new();
    harness.gateway.tasks.cache().put(1, task(1, "A"));
    harness.tasks.fail_with(Failure::ConnectionRefused);

    for _ in 0..breaker_config().failure_threshold {
        assert_eq!(harness.gateway.tasks.get_by_id(1).await.unwrap(), task(1, "A"));
    }
    let calls_when_opened = harness.tasks.calls.get.load(Ordering::SeqCst);
    assert_eq!(calls_when_opened, 3);

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.state(), CircuitState::Open);

    // Still served from cache, upstream untouched
    assert_eq!(harness.gateway.tasks.get_by_id(1).await.unwrap(), task(1, "A"));
    assert_eq!(harness.tasks.calls.get.load(Ordering::SeqCst), calls_when_opened);
}

#[tokio::test]
#[traced_test]
async fn test_circuit_recovers_after_open_timeout() {
    let harness = Harness::with_config(CircuitBreakerConfig {
        failure_threshold: 1,
        open_timeout_ms: 50,
        half_open_max_calls: 1,
        shared_circuit: false,
    });
    harness.tasks.seed([task(1, "A")]);
    harness.tasks.fail_with(Failure::ServerError);
    let _ = harness.gateway.tasks.get_by_id(1).await;

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.state(), CircuitState::Open);

    harness.tasks.recover();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.gateway.tasks.get_by_id(1).await.unwrap(), task(1, "A"));
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
#[traced_test]
async fn test_writes_bypass_breaker_and_cache() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A")]);
    harness.gateway.tasks.cache().put(1, task(1, "A"));
    harness.open_task_circuit();

    let created = harness
        .gateway
        .tasks
        .create(&task_request(None, "new"))
        .await
        .unwrap();
    let updated = harness
        .gateway
        .tasks
        .update(&task_request(Some(1), "A2"))
        .await
        .unwrap();
    harness.gateway.tasks.delete(1).await.unwrap();

    assert_eq!(created.task_title, "new");
    assert_eq!(updated.task_title, "A2");
    assert_eq!(harness.tasks.calls.writes(), 3);

    // Cache untouched: not populated by create, not refreshed by update,
    // not invalidated by delete
    let cache = harness.gateway.tasks.cache();
    assert_eq!(cache.len(), 1);
    assert!(!cache.contains(created.task_id));
    assert_eq!(cache.get(1), Some(task(1, "A")));

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.metrics().total_calls, 0);
    assert_eq!(breaker.metrics().rejected_count, 0);
}

#[tokio::test]
#[traced_test]
async fn test_deleted_entity_still_served_by_fallback() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A")]);
    harness.gateway.tasks.get_by_id(1).await.unwrap();

    harness.gateway.tasks.delete(1).await.unwrap();
    harness.open_task_circuit();

    assert_eq!(harness.gateway.tasks.get_by_id(1).await.unwrap(), task(1, "A"));
}

#[tokio::test]
#[traced_test]
async fn test_write_failures_propagate_unchanged() {
    let harness = Harness::new();
    harness.tasks.fail_with(Failure::Timeout);

    let result = harness.gateway.tasks.create(&task_request(None, "new")).await;
    assert!(matches!(result, Err(ServiceError::Upstream(UpstreamError::Timeout))));

    harness.tasks.recover();
    let result = harness.gateway.tasks.delete(404).await;
    assert!(matches!(result, Err(ServiceError::NotFound { .. })));

    let result = harness
        .gateway
        .tasks
        .update(&task_request(Some(404), "nope"))
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound { .. })));

    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().total_calls, 0);
}

#[tokio::test]
#[traced_test]
async fn test_concurrent_reads_for_distinct_ids_lose_no_updates() {
    let harness = Harness::new();
    harness
        .tasks
        .seed((0..50).map(|i| task(i, &format!("task {}", i))));
    let service = harness.gateway.tasks.clone();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move { service.get_by_id(i).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().is_ok());
    }

    let cache = harness.gateway.tasks.cache();
    for i in 0..50 {
        assert_eq!(cache.get(i).unwrap().task_title, format!("task {}", i));
    }
}

#[tokio::test]
#[traced_test]
async fn test_abandoned_read_still_updates_cache() {
    let harness = Harness::new();
    harness.tasks.seed([task(1, "A")]);
    harness.tasks.set_latency(Duration::from_millis(100));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), harness.gateway.tasks.get_by_id(1)).await;
    assert!(abandoned.is_err());
    assert!(harness.gateway.tasks.cache().is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(harness.gateway.tasks.cache().get(1), Some(task(1, "A")));
    let breaker = harness
        .gateway
        .breakers
        .circuit_breaker(harness.gateway.tasks.circuit());
    assert_eq!(breaker.metrics().success_count, 1);
}

#[tokio::test]
#[traced_test]
async fn test_circuits_are_isolated_per_resource_by_default() {
    let harness = Harness::new();
    harness.users.seed([user(1, "Ada")]);
    harness.open_task_circuit();

    assert_eq!(harness.gateway.users.get_by_id(1).await.unwrap(), user(1, "Ada"));
    assert_eq!(harness.users.calls.get.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[traced_test]
async fn test_shared_circuit_couples_resources() {
    let harness = Harness::with_config(CircuitBreakerConfig {
        shared_circuit: true,
        ..breaker_config()
    });
    harness.users.seed([user(1, "Ada")]);
    harness.gateway.users.cache().put(1, user(1, "Ada (cached)"));
    harness.open_task_circuit();

    let fetched = harness.gateway.users.get_by_id(1).await.unwrap();

    assert_eq!(fetched.full_name, "Ada (cached)");
    assert_eq!(harness.users.calls.get.load(Ordering::SeqCst), 0);
}
