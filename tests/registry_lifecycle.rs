//! Lifecycle tests for the handler registry: ordering, vetoes, reinit and
//! shutdown.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use handler_proxy::registry::{
    Handler, HandlerDescriptor, HandlerError, HandlerRegistration, HandlerRegistry, InitStatus,
    LifecycleState, LifecycleStep, LoadOrder, ManagedHandler, RegistryError, RegistryHooks,
    RegistrySettings, Severity, TaskContext,
};

mod common;
use common::{registration, Concurrency, EventLog, Script, ScriptedHandler};

fn registry(concurrency: usize) -> HandlerRegistry {
    HandlerRegistry::new(RegistrySettings {
        init_concurrency: concurrency,
        drain_timeout: Duration::from_secs(10),
    })
}

fn handler(name: &str, log: &EventLog) -> Arc<ScriptedHandler> {
    Arc::new(ScriptedHandler::new(name, log))
}

#[tokio::test]
async fn test_first_handlers_init_serially_before_normal() {
    let log = EventLog::default();
    let first_a = Arc::new(ScriptedHandler::new("first-a", &log).delay(Duration::from_millis(50)));
    let first_b = Arc::new(ScriptedHandler::new("first-b", &log).delay(Duration::from_millis(50)));
    let normal_a = handler("normal-a", &log);
    let normal_b = handler("normal-b", &log);

    let registry = registry(5);
    let registrations = vec![
        registration(&normal_a, LoadOrder::Normal),
        registration(&first_a, LoadOrder::First),
        registration(&normal_b, LoadOrder::Normal),
        registration(&first_b, LoadOrder::First),
    ];
    let inited = registry.init(registrations, &TaskContext::new()).await.unwrap();
    assert_eq!(inited.len(), 4);

    // declaration order among FIRST handlers, each done before the next starts
    let a_done = log.position("activate:first-a").unwrap();
    let b_start = log.position("init-start:first-b").unwrap();
    assert!(a_done < b_start, "events: {:?}", log.events());

    let b_done = log.position("activate:first-b").unwrap();
    for name in ["normal-a", "normal-b"] {
        let start = log.position(&format!("init-start:{name}")).unwrap();
        assert!(b_done < start, "events: {:?}", log.events());
    }

    for name in ["first-a", "first-b", "normal-a", "normal-b"] {
        assert!(registry.handler(name).unwrap().is_active());
    }
}

#[tokio::test]
async fn test_normal_init_concurrency_is_bounded() {
    let log = EventLog::default();
    let concurrency = Concurrency::default();
    let handlers: Vec<_> = (0..12)
        .map(|i| {
            Arc::new(
                ScriptedHandler::new(&format!("h{i}"), &log)
                    .delay(Duration::from_millis(40))
                    .tracked(&concurrency),
            )
        })
        .collect();

    let registry = registry(3);
    let registrations = handlers.iter().map(|h| registration(h, LoadOrder::Normal)).collect();
    let inited = registry.init(registrations, &TaskContext::new()).await.unwrap();

    assert_eq!(inited.len(), 12);
    assert!(concurrency.peak() <= 3, "peak was {}", concurrency.peak());
    assert!(concurrency.peak() >= 2, "inits never overlapped");
}

#[tokio::test]
async fn test_first_veto_aborts_before_normal_stage() {
    let log = EventLog::default();
    let auth = Arc::new(ScriptedHandler::new("auth", &log).script(Script::Veto));
    let orders = handler("orders", &log);

    let registry = registry(5);
    let err = registry
        .init(
            vec![registration(&orders, LoadOrder::Normal), registration(&auth, LoadOrder::First)],
            &TaskContext::new(),
        )
        .await
        .unwrap_err();

    match &err {
        RegistryError::Veto { handler, kind, cause } => {
            assert_eq!(handler, "auth");
            assert_eq!(kind, "scripted");
            assert!(cause.as_ref().unwrap().to_string().contains("auth cannot start"));
        }
        other => panic!("expected veto, got {other:?}"),
    }
    assert!(err.is_fatal());
    assert_eq!(orders.init_count(), 0);
    assert!(registry.handlers().is_empty());
    assert_eq!(
        registry.member("auth").unwrap().state(),
        LifecycleState::Failed(Severity::Vetoing)
    );
}

#[tokio::test]
async fn test_normal_veto_fails_init() {
    let log = EventLog::default();
    let good = handler("good", &log);
    let bad = Arc::new(ScriptedHandler::new("bad", &log).script(Script::Veto));

    let registry = registry(5);
    let err = registry
        .init(
            vec![registration(&good, LoadOrder::Normal), registration(&bad, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.handler(), "bad");
    assert!(registry.handler("bad").is_none());
}

#[tokio::test]
async fn test_sibling_finishing_after_veto_is_released() {
    let log = EventLog::default();
    let bad = Arc::new(ScriptedHandler::new("bad", &log).script(Script::Veto));
    let slow = Arc::new(ScriptedHandler::new("slow", &log).delay(Duration::from_millis(200)));

    let registry = registry(5);
    let result = registry
        .init(
            vec![registration(&bad, LoadOrder::Normal), registration(&slow, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await;

    assert!(matches!(result, Err(RegistryError::Veto { .. })));
    assert_eq!(slow.init_count(), 1);
    assert_eq!(slow.shutdown_count(), 1);
    assert_eq!(log.count("activate:slow"), 0);
    assert!(registry.handler("slow").is_none());
}

#[tokio::test]
async fn test_drain_timeout_bounds_veto_abort() {
    let log = EventLog::default();
    let bad = Arc::new(ScriptedHandler::new("bad", &log).script(Script::Veto));
    let stuck = Arc::new(ScriptedHandler::new("stuck", &log).delay(Duration::from_secs(30)));

    let registry = HandlerRegistry::new(RegistrySettings {
        init_concurrency: 5,
        drain_timeout: Duration::from_millis(100),
    });

    let started = Instant::now();
    let result = registry
        .init(
            vec![registration(&bad, LoadOrder::Normal), registration(&stuck, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await;

    assert!(matches!(result, Err(RegistryError::Veto { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(registry.handler("stuck").is_none());
}

#[tokio::test]
async fn test_non_veto_failure_drops_only_that_handler() {
    let log = EventLog::default();
    let flaky = Arc::new(ScriptedHandler::new("flaky", &log).script(Script::NonVeto));
    let steady = handler("steady", &log);

    let registry = registry(5);
    let inited = registry
        .init(
            vec![registration(&flaky, LoadOrder::First), registration(&steady, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(inited.len(), 1);
    assert_eq!(inited[0].handler.name(), "steady");
    assert!(registry.handler("flaky").is_none());

    let failed = registry.member("flaky").unwrap();
    assert_eq!(failed.state(), LifecycleState::Failed(Severity::NonVetoing));
    let outcome = failed.init_outcome().unwrap();
    assert_eq!(outcome.status(), InitStatus::NonVetoFailure);
    assert!(outcome.cause().unwrap().to_string().contains("flaky degraded"));
}

#[tokio::test]
async fn test_activation_failure_is_non_vetoing() {
    let log = EventLog::default();
    let picky = handler("picky", &log);
    picky.fail_activate(true);

    let registry = registry(5);
    let inited = registry
        .init(vec![registration(&picky, LoadOrder::Normal)], &TaskContext::new())
        .await
        .unwrap();

    assert!(inited.is_empty());
    assert!(registry.handler("picky").is_none());
    assert_eq!(
        registry.member("picky").unwrap().init_outcome().unwrap().status(),
        InitStatus::NonVetoFailure
    );
}

#[tokio::test]
async fn test_worker_panic_terminates_pool() {
    let log = EventLog::default();
    let broken = Arc::new(ScriptedHandler::new("broken", &log).script(Script::Panic));

    let registry = registry(5);
    let err = registry
        .init(vec![registration(&broken, LoadOrder::Normal)], &TaskContext::new())
        .await
        .unwrap_err();

    match err {
        RegistryError::PoolTermination { handler, .. } => assert_eq!(handler, "broken"),
        other => panic!("expected pool termination, got {other:?}"),
    }
}

#[tokio::test]
async fn test_resolution_failure_is_fatal() {
    let descriptor = HandlerDescriptor::new("ghost", "1.0", LoadOrder::Normal, Default::default());
    let registration = HandlerRegistration::new(descriptor, |_: &HandlerDescriptor| {
        Err::<Vec<Arc<dyn Handler>>, _>(HandlerError::Config("no such plugin".into()))
    });

    let err = registry(5)
        .init(vec![registration], &TaskContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Resolution { ref descriptor, .. } if descriptor == "ghost"));
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    let again = registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();

    assert!(again.is_empty());
    assert_eq!(svc.init_count(), 1);
    assert_eq!(registry.handlers().len(), 1);
}

#[tokio::test]
async fn test_failed_handler_retried_by_init() {
    let log = EventLog::default();
    let svc = Arc::new(ScriptedHandler::new("svc", &log).script(Script::NonVeto));
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    assert!(registry.handler("svc").is_none());

    svc.set_script(Script::Succeed);
    let inited = registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    assert_eq!(inited.len(), 1);
    assert!(registry.handler("svc").unwrap().is_active());
}

#[tokio::test]
async fn test_version_assigned_from_descriptor() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let descriptor = HandlerDescriptor::new("svc", "2.4", LoadOrder::Normal, Default::default());
    let registry = registry(5);

    registry
        .init(vec![HandlerRegistration::single(descriptor, svc.clone())], &TaskContext::new())
        .await
        .unwrap();

    let managed = registry.handler("svc").unwrap();
    assert_eq!(managed.version(), "2.4");
    assert_eq!(managed.status().version, "2.4");
}

fn versioned(handler: &Arc<ScriptedHandler>, version: &str) -> HandlerRegistration {
    let descriptor = HandlerDescriptor::new(handler.name(), version, LoadOrder::Normal, Default::default());
    HandlerRegistration::single(descriptor, handler.clone())
}

#[tokio::test]
async fn test_active_handler_keeps_version_on_repeated_init() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![versioned(&svc, "1.0")], &ctx).await.unwrap();
    let again = registry.init(vec![versioned(&svc, "2.0")], &ctx).await.unwrap();

    assert!(again.is_empty());
    assert_eq!(svc.init_count(), 1);
    assert_eq!(registry.handler("svc").unwrap().version(), "1.0");
}

#[tokio::test]
async fn test_init_rejects_second_live_instance() {
    let log = EventLog::default();
    let old = handler("svc", &log);
    let new = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![versioned(&old, "1.0")], &ctx).await.unwrap();
    let err = registry.init(vec![versioned(&new, "2.0")], &ctx).await.unwrap_err();

    match &err {
        RegistryError::Conflict { handler, active_version } => {
            assert_eq!(handler, "svc");
            assert_eq!(active_version, "1.0");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(err.is_fatal());
    assert_eq!(new.init_count(), 0);

    let live = registry.handler("svc").unwrap();
    assert_eq!(live.version(), "1.0");
    let expected: Arc<dyn Handler> = old.clone();
    assert!(Arc::ptr_eq(live.handler(), &expected));
}

#[tokio::test]
async fn test_init_rejects_duplicate_names_in_one_call() {
    let log = EventLog::default();
    let a = handler("svc", &log);
    let b = handler("svc", &log);

    let registry = registry(5);
    let err = registry
        .init(vec![versioned(&a, "1.0"), versioned(&b, "1.0")], &TaskContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::Conflict { .. }));
    assert_eq!(a.init_count() + b.init_count(), 0);
}

#[tokio::test]
async fn test_new_instance_replaces_member_after_failed_retire() {
    let log = EventLog::default();
    let old = handler("svc", &log);
    old.fail_shutdown(true);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![versioned(&old, "1.0")], &ctx).await.unwrap();
    let err = registry.retire_handler("svc", &ctx).await.unwrap_err();
    assert!(matches!(err, RegistryError::Shutdown { step: LifecycleStep::Shutdown, .. }));
    assert!(registry.handler("svc").is_none());
    assert!(registry.member("svc").is_none());

    let new = handler("svc", &log);
    let inited = registry.init(vec![versioned(&new, "2.0")], &ctx).await.unwrap();

    assert_eq!(inited.len(), 1);
    assert_eq!(new.init_count(), 1);
    assert_eq!(old.init_count(), 1);
    let live = registry.handler("svc").unwrap();
    assert_eq!(live.version(), "2.0");
    let expected: Arc<dyn Handler> = new.clone();
    assert!(Arc::ptr_eq(live.handler(), &expected));
}

#[tokio::test]
async fn test_failed_member_replaced_by_new_instance() {
    let log = EventLog::default();
    let old = Arc::new(ScriptedHandler::new("svc", &log).script(Script::NonVeto));
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![versioned(&old, "1.0")], &ctx).await.unwrap();
    assert!(registry.handler("svc").is_none());

    let new = handler("svc", &log);
    registry.init(vec![versioned(&new, "1.1")], &ctx).await.unwrap();

    assert_eq!(registry.handler("svc").unwrap().version(), "1.1");
    assert_eq!(registry.statuses().len(), 1);
}

#[tokio::test]
async fn test_veto_unpublishes_handlers_of_the_same_stage() {
    let log = EventLog::default();
    let fast = handler("fast", &log);
    let bad = Arc::new(
        ScriptedHandler::new("bad", &log)
            .script(Script::Veto)
            .delay(Duration::from_millis(100)),
    );

    let registry = registry(5);
    let result = registry
        .init(
            vec![registration(&fast, LoadOrder::Normal), registration(&bad, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await;

    assert!(matches!(result, Err(RegistryError::Veto { .. })));
    assert!(log.position("activate:fast").unwrap() < log.position("deactivate:fast").unwrap());
    assert_eq!(fast.shutdown_count(), 1);
    assert!(registry.handler("fast").is_none());
    assert!(registry.handlers().is_empty());
    assert_eq!(registry.member("fast").unwrap().state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn test_reinit_cycles_in_order() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    let before = registry.handler("svc").unwrap();

    registry.reinit_handler("svc", &ctx).await.unwrap();

    let events = log.events();
    let tail: Vec<&str> = events.iter().skip(3).map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["deactivate:svc", "shutdown:svc", "init-start:svc", "init:svc", "activate:svc"]
    );

    let after = registry.handler("svc").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(after.is_active());
    assert_eq!(svc.init_count(), 2);
}

#[tokio::test]
async fn test_reload_brings_failed_handler_back() {
    let log = EventLog::default();
    let svc = Arc::new(ScriptedHandler::new("svc", &log).script(Script::NonVeto));
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    assert!(registry.handler("svc").is_none());

    svc.set_script(Script::Succeed);
    registry.reload_handler("svc", &ctx).await.unwrap();

    let managed = registry.handler("svc").unwrap();
    assert!(managed.is_active());
    assert!(managed.init_outcome().unwrap().is_success());
}

#[tokio::test]
async fn test_reinit_failure_leaves_handler_unpublished() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    svc.set_script(Script::NonVeto);

    let err = registry.reinit_handler("svc", &ctx).await.unwrap_err();
    match &err {
        RegistryError::Cycle { handler, step, source, .. } => {
            assert_eq!(handler, "svc");
            assert_eq!(*step, LifecycleStep::Init);
            assert!(source.to_string().contains("svc degraded"));
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
    assert!(!err.is_fatal());
    assert!(registry.handler("svc").is_none());
    assert_eq!(
        registry.member("svc").unwrap().state(),
        LifecycleState::Failed(Severity::NonVetoing)
    );
}

#[tokio::test]
async fn test_reinit_shutdown_failure_reports_step() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();
    svc.fail_shutdown(true);

    let err = registry.reload_handler("svc", &ctx).await.unwrap_err();
    assert!(matches!(err, RegistryError::Cycle { step: LifecycleStep::Shutdown, .. }));
    assert_eq!(svc.init_count(), 1);
}

#[tokio::test]
async fn test_reinit_unknown_handler_is_noop() {
    let registry = registry(5);
    assert!(registry.reinit_handler("nobody", &TaskContext::new()).await.is_ok());
}

#[tokio::test]
async fn test_readers_never_see_handler_mid_reinit() {
    let log = EventLog::default();
    let slow = Arc::new(ScriptedHandler::new("svc", &log).delay(Duration::from_millis(300)));
    let registry = Arc::new(registry(5));
    let ctx = TaskContext::new();

    registry.init(vec![registration(&slow, LoadOrder::Normal)], &ctx).await.unwrap();

    let cycling = {
        let registry = registry.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { registry.reinit_handler("svc", &ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.handler("svc").is_none());
    assert!(registry.trace_filter_for_handler("svc").is_none());
    assert_eq!(registry.member("svc").unwrap().state(), LifecycleState::Initializing);

    cycling.await.unwrap().unwrap();
    assert!(registry.handler("svc").unwrap().is_active());
}

#[tokio::test]
async fn test_readers_never_see_handler_mid_retire() {
    let log = EventLog::default();
    let slow = Arc::new(
        ScriptedHandler::new("svc", &log)
            .traced(1)
            .slow_shutdown(Duration::from_millis(300)),
    );
    let registry = Arc::new(registry(5));
    let ctx = TaskContext::new();

    registry.init(vec![registration(&slow, LoadOrder::Normal)], &ctx).await.unwrap();

    let retiring = {
        let registry = registry.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { registry.retire_handler("svc", &ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(slow.shutdown_count(), 1);
    assert!(registry.handler("svc").is_none());
    assert!(registry.trace_filter_for_handler("svc").is_none());

    assert!(retiring.await.unwrap().unwrap());
    assert!(registry.member("svc").is_none());
}

#[tokio::test]
async fn test_trace_filters_follow_active_handlers() {
    let log = EventLog::default();
    let traced = Arc::new(ScriptedHandler::new("traced", &log).traced(1));
    let plain = handler("plain", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry
        .init(
            vec![registration(&traced, LoadOrder::Normal), registration(&plain, LoadOrder::Normal)],
            &ctx,
        )
        .await
        .unwrap();

    assert!(registry.trace_filter_for_handler("traced").unwrap().should_trace("GET /"));
    assert!(registry.trace_filter_for_handler("plain").is_none());

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.handlers.len(), 2);
    assert_eq!(snapshot.trace_filters.len(), 1);

    registry.shutdown(&ctx).await;
    assert!(registry.trace_filter_for_handler("traced").is_none());
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RegistryHooks for RecordingHooks {
    fn post_init(&self, handler: &ManagedHandler) {
        assert_eq!(handler.state(), LifecycleState::Initializing);
        self.events.lock().unwrap().push(format!("post_init:{}", handler.name()));
    }

    fn post_unregister(&self, handler: &ManagedHandler) {
        self.events.lock().unwrap().push(format!("post_unregister:{}", handler.name()));
    }
}

#[tokio::test]
async fn test_shutdown_runs_hooks_and_empties_table() {
    let log = EventLog::default();
    let a = handler("a", &log);
    let b = handler("b", &log);
    let hooks = Arc::new(RecordingHooks::default());
    let registry = HandlerRegistry::with_hooks(RegistrySettings::default(), hooks.clone());
    let ctx = TaskContext::new();

    registry
        .init(vec![registration(&a, LoadOrder::First), registration(&b, LoadOrder::Normal)], &ctx)
        .await
        .unwrap();
    assert_eq!(
        *hooks.events.lock().unwrap(),
        vec!["post_init:a".to_string(), "post_init:b".to_string()]
    );

    registry.shutdown(&ctx).await;

    assert!(registry.handlers().is_empty());
    assert!(registry.member("a").is_none());
    let events = hooks.events.lock().unwrap().clone();
    assert!(events.contains(&"post_unregister:a".to_string()));
    assert!(events.contains(&"post_unregister:b".to_string()));

    // shutdown before deactivate, per handler
    assert!(log.position("shutdown:a").unwrap() < log.position("deactivate:a").unwrap());
}

#[tokio::test]
async fn test_shutdown_continues_past_failures() {
    let log = EventLog::default();
    let stubborn = handler("stubborn", &log);
    let polite = handler("polite", &log);
    stubborn.fail_shutdown(true);

    let registry = registry(5);
    let ctx = TaskContext::new();
    registry
        .init(
            vec![registration(&stubborn, LoadOrder::Normal), registration(&polite, LoadOrder::Normal)],
            &ctx,
        )
        .await
        .unwrap();

    registry.shutdown(&ctx).await;

    assert!(registry.handler("polite").is_none());
    assert!(registry.handler("stubborn").is_some());
    assert_eq!(polite.shutdown_count(), 1);
}

#[tokio::test]
async fn test_retire_handler() {
    let log = EventLog::default();
    let svc = handler("svc", &log);
    let registry = registry(5);
    let ctx = TaskContext::new();

    registry.init(vec![registration(&svc, LoadOrder::Normal)], &ctx).await.unwrap();

    assert!(registry.retire_handler("svc", &ctx).await.unwrap());
    assert!(registry.handler("svc").is_none());
    assert!(registry.member("svc").is_none());
    assert_eq!(svc.shutdown_count(), 1);
    assert!(!registry.retire_handler("svc", &ctx).await.unwrap());
}

#[tokio::test]
async fn test_statuses_report_every_member() {
    let log = EventLog::default();
    let ok = handler("ok", &log);
    let broken = Arc::new(ScriptedHandler::new("broken", &log).script(Script::NonVeto));
    let registry = registry(5);

    registry
        .init(
            vec![registration(&ok, LoadOrder::Normal), registration(&broken, LoadOrder::Normal)],
            &TaskContext::new(),
        )
        .await
        .unwrap();

    let statuses = registry.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].name, "broken");
    assert_eq!(statuses[0].state, "failed_non_vetoing");
    assert_eq!(statuses[0].outcome, Some(InitStatus::NonVetoFailure));
    assert!(statuses[0].cause.is_some());
    assert_eq!(statuses[1].name, "ok");
    assert_eq!(statuses[1].state, "active");
}
