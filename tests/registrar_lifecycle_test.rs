//! 注册器生命周期集成测试
//!
//! 使用内存后端和暂停的 tokio 时钟，确定性地验证注册、心跳与注销的时间行为。

use flare_service_registrar::discovery::backend::memory::BackendCall;
use flare_service_registrar::{
    DiscoveryBackend, HealthStatus, InMemoryBackend, LifecycleState, LifecycleTimings,
    RegistryError, ServiceRegistrar,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

const TICK: Duration = Duration::from_secs(10);

/// 推进时钟并让出执行权，保证到期的心跳任务被调度
async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn registrar_on(backend: &InMemoryBackend) -> ServiceRegistrar {
    ServiceRegistrar::with_backend("orders", 8080, Arc::new(backend.clone()))
}

/// 测试：完整场景（注册 → 三次心跳 → 注销）
#[tokio::test(start_paused = true)]
async fn test_orders_service_full_lifecycle() {
    // 同一参数也可以构建真实的 Consul 注册器
    assert_ok!(ServiceRegistrar::new("orders", 8080, "127.0.0.1:8500"));

    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();

    assert_ok!(registrar.register().await);
    assert_eq!(
        backend.calls(),
        vec![BackendCall::Register {
            service_id: id.clone(),
            name: "orders".to_string(),
            port: 8080,
            ttl: Duration::from_secs(15),
            status: HealthStatus::Passing,
        }]
    );

    for expected in 1..=3 {
        advance(TICK).await;
        assert_eq!(backend.refresh_count(&id), expected);
        assert_eq!(backend.health(&id), Some(HealthStatus::Passing));
    }

    let cancelled = registrar.cancellation_token();
    assert_ok!(registrar.unregister().await);
    assert!(cancelled.is_cancelled());
    assert_eq!(registrar.state().await, LifecycleState::Terminated);

    // 心跳任务最迟在下一个唤醒点退出
    let deadline = Instant::now() + TICK;
    while !registrar.heartbeat_stopped().await {
        assert!(Instant::now() < deadline, "heartbeat task still running after one tick");
        advance(Duration::from_millis(100)).await;
    }

    assert_eq!(backend.deregister_count(&id), 1);
    assert!(!backend.is_registered(&id));
}

/// 测试：实例 ID 互不相同
#[tokio::test]
async fn test_identities_are_unique() {
    let backend = InMemoryBackend::new();
    let registrars: Vec<ServiceRegistrar> = (0..256).map(|_| registrar_on(&backend)).collect();

    let ids: HashSet<&str> = registrars.iter().map(|r| r.service_id()).collect();
    assert_eq!(ids.len(), registrars.len());
}

/// 测试：未注册就注销
#[tokio::test(start_paused = true)]
async fn test_unregister_before_register() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    let cancelled = registrar.cancellation_token();

    assert_ok!(registrar.unregister().await);
    assert!(cancelled.is_cancelled());

    advance(TICK * 6).await;
    assert_eq!(backend.refresh_count(&id), 0);
    assert_eq!(backend.deregister_count(&id), 1);
    assert!(registrar.heartbeat_stopped().await);

    // 已注销后不能再注册
    let err = assert_err!(registrar.register().await);
    assert!(matches!(err, RegistryError::Terminated { .. }));
    assert_eq!(backend.register_count(&id), 0);
}

/// 测试：注销后不再发送心跳
#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_refresh() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    advance(Duration::from_secs(25)).await;
    assert_eq!(backend.refresh_count(&id), 2);

    assert_ok!(registrar.unregister().await);
    // 宽限期：最多一个心跳间隔
    advance(TICK).await;
    let after_grace = backend.refresh_count(&id);
    assert!(after_grace <= 3);

    advance(TICK * 10).await;
    assert_eq!(backend.refresh_count(&id), after_grace);
    assert!(registrar.heartbeat_stopped().await);
}

/// 测试：TTL 窗口能容纳一次失败时，单次失败不会导致不健康
#[tokio::test(start_paused = true)]
async fn test_single_refresh_failure_is_tolerated() {
    let backend = InMemoryBackend::new();
    let timings = LifecycleTimings::new(Duration::from_secs(25), TICK).unwrap();
    assert_eq!(timings.tolerated_misses(), 1);
    let registrar = registrar_on(&backend).with_timings(timings);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    advance(TICK).await;
    backend.fail_next_refreshes(1, "agent restarting");
    for _ in 0..4 {
        advance(TICK).await;
        assert_eq!(backend.health(&id), Some(HealthStatus::Passing));
    }

    let service = backend.service(&id).unwrap();
    assert!(!service.ttl_ever_lapsed(Instant::now()));
    assert_eq!(backend.refresh_count(&id), 5);

    assert_ok!(registrar.unregister().await);
}

/// 测试：默认参数下单次失败后由下一次心跳恢复，心跳任务不会退出
#[tokio::test(start_paused = true)]
async fn test_default_timings_recover_on_next_tick() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    backend.fail_next_refreshes(1, "agent restarting");
    advance(TICK).await;
    assert_eq!(backend.refresh_count(&id), 1);
    assert!(!registrar.heartbeat_stopped().await);

    advance(TICK).await;
    assert_eq!(backend.refresh_count(&id), 2);
    assert_eq!(backend.health(&id), Some(HealthStatus::Passing));

    assert_ok!(registrar.unregister().await);
}

/// 测试：连续两次失败会让 TTL 过期
#[tokio::test(start_paused = true)]
async fn test_two_consecutive_failures_expire_ttl() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    backend.fail_next_refreshes(2, "agent down");
    advance(TICK * 2).await;

    assert_eq!(backend.refresh_count(&id), 2);
    assert_eq!(backend.health(&id), Some(HealthStatus::Critical));

    // 后端恢复后下一次心跳重新置为 passing
    advance(TICK).await;
    assert_eq!(backend.health(&id), Some(HealthStatus::Passing));

    assert_ok!(registrar.unregister().await);
}

/// 测试：记录已被移除时注销仍然成功
#[tokio::test]
async fn test_deregistration_is_idempotent() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    // 模拟记录已被其他方移除
    assert_ok!(backend.deregister_service(&id).await);
    assert!(!backend.is_registered(&id));

    assert_ok!(registrar.unregister().await);
    assert_eq!(backend.deregister_count(&id), 2);
}

/// 测试：并发注册与注销不会遗留心跳任务
#[tokio::test(start_paused = true)]
async fn test_concurrent_register_and_unregister() {
    let backend = InMemoryBackend::new();
    let registrar = Arc::new(registrar_on(&backend));
    let id = registrar.service_id().to_string();

    let (registered, unregistered) = tokio::join!(
        {
            let registrar = registrar.clone();
            async move { registrar.register().await }
        },
        {
            let registrar = registrar.clone();
            async move { registrar.unregister().await }
        }
    );

    assert_ok!(unregistered);
    if let Err(err) = registered {
        assert!(matches!(err, RegistryError::Terminated { .. }));
    }

    advance(TICK * 6).await;
    assert_eq!(registrar.state().await, LifecycleState::Terminated);
    assert_eq!(backend.refresh_count(&id), 0);
    assert!(registrar.heartbeat_stopped().await);
    assert!(!backend.is_registered(&id));
}

/// 测试：后端注册卡住时注销仍然立即完成
#[tokio::test(start_paused = true)]
async fn test_unregister_does_not_wait_for_stalled_registration() {
    let backend = InMemoryBackend::new();
    let _stalled = backend.hold_registers();
    let registrar = Arc::new(registrar_on(&backend));
    let id = registrar.service_id().to_string();
    let cancelled = registrar.cancellation_token();

    let registering = tokio::spawn({
        let registrar = registrar.clone();
        async move { registrar.register().await }
    });
    settle().await;
    assert_eq!(backend.register_count(&id), 1);
    assert!(!registering.is_finished());

    let unregistered = tokio::time::timeout(Duration::from_secs(2), registrar.unregister())
        .await
        .expect("unregister blocked behind a stalled registration");
    assert_ok!(unregistered);
    assert!(cancelled.is_cancelled());

    let err = assert_err!(registering.await.unwrap());
    assert!(matches!(err, RegistryError::Terminated { .. }));

    advance(TICK * 3).await;
    assert_eq!(registrar.state().await, LifecycleState::Terminated);
    assert_eq!(backend.refresh_count(&id), 0);
    assert_eq!(backend.deregister_count(&id), 1);
    assert!(registrar.heartbeat_stopped().await);
}

/// 测试：注销不等待进行中的心跳，心跳返回后任务退出
#[tokio::test(start_paused = true)]
async fn test_unregister_overlaps_in_flight_refresh() {
    let backend = InMemoryBackend::new();
    let registrar = registrar_on(&backend);
    let id = registrar.service_id().to_string();
    assert_ok!(registrar.register().await);

    let gate = backend.hold_refreshes();
    advance(TICK).await;
    assert_eq!(backend.pending_refreshes(), 1);

    let unregistered = tokio::time::timeout(Duration::from_secs(1), registrar.unregister())
        .await
        .expect("unregister waited for the in-flight heartbeat");
    assert_ok!(unregistered);

    // 注销请求在心跳请求返回之前就已发出
    assert_eq!(backend.pending_refreshes(), 1);
    assert_eq!(
        backend.calls().last(),
        Some(&BackendCall::Deregister { service_id: id.clone() })
    );
    assert!(!registrar.heartbeat_stopped().await);

    gate.release();
    settle().await;
    assert_eq!(backend.pending_refreshes(), 0);
    assert!(registrar.heartbeat_stopped().await);

    advance(TICK * 3).await;
    assert_eq!(backend.refresh_count(&id), 1);
    assert!(!backend.is_registered(&id));
}
