//! Session registry binding and release across execution contexts.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{unique_context, RecordingFactory};
use tapline_core::capability::CapabilitySet;
use tapline_core::registry::SessionRegistry;
use tapline_core::session::{ContextId, Endpoint};
use tapline_core::transport::TransportError;
use tapline_core::Error;

fn endpoint() -> Endpoint {
    Endpoint::local("127.0.0.1", 4723).unwrap()
}

fn registry() -> (Arc<RecordingFactory>, SessionRegistry) {
    let factory = Arc::new(RecordingFactory::new());
    let registry = SessionRegistry::new(factory.clone());
    (factory, registry)
}

#[tokio::test]
async fn create_bind_current_release() {
    let (factory, registry) = registry();
    let ctx = unique_context();

    let mut caps = CapabilitySet::new();
    caps.insert("platformName", "Android");
    let handle = registry.create(caps, endpoint()).await.unwrap();
    assert_eq!(factory.open_count(), 1);
    assert!(!registry.is_bound(&ctx));

    registry.bind(&ctx, handle.clone()).unwrap();
    let current = registry.current(&ctx).unwrap();
    assert_eq!(current.id(), handle.id());
    assert_eq!(current.capabilities().get_str("platformName"), Some("Android"));
    assert_eq!(registry.active(), 1);

    registry.release(&ctx).await;
    assert!(!registry.is_bound(&ctx));
    assert_eq!(registry.active(), 0);
    assert_eq!(factory.last_transport().unwrap().quit_calls(), 1);
}

#[tokio::test]
async fn current_without_bind_is_not_initialized() {
    let (_, registry) = registry();
    let ctx = ContextId::new("worker-7");
    match registry.current(&ctx) {
        Err(Error::NotInitialized { context }) => assert_eq!(context, "worker-7"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn double_bind_is_rejected_and_keeps_first_session() {
    let (_, registry) = registry();
    let ctx = unique_context();

    let first = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
    let second = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
    registry.bind(&ctx, first.clone()).unwrap();

    let err = registry.bind(&ctx, second).unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }));
    assert_eq!(registry.current(&ctx).unwrap().id(), first.id());
}

#[tokio::test]
async fn release_of_unbound_context_is_a_no_op() {
    let (factory, registry) = registry();
    let ctx = unique_context();

    registry.release(&ctx).await;
    assert_eq!(registry.active(), 0);

    let handle = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
    registry.bind(&ctx, handle).unwrap();
    registry.release(&ctx).await;
    registry.release(&ctx).await;
    assert_eq!(factory.last_transport().unwrap().quit_calls(), 1);
}

#[tokio::test]
async fn release_clears_binding_when_quit_fails() {
    let (factory, registry) = registry();
    let ctx = unique_context();

    let handle = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
    factory.last_transport().unwrap().set_quit_fails(true);
    registry.bind(&ctx, handle).unwrap();

    registry.release(&ctx).await;
    assert!(!registry.is_bound(&ctx));

    let replacement = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
    registry.bind(&ctx, replacement).unwrap();
}

#[tokio::test]
async fn factory_failure_propagates_and_binds_nothing() {
    let (factory, registry) = registry();
    factory.refuse_sessions();

    let err = registry
        .create(CapabilitySet::new(), endpoint())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::SessionNotCreated(_))
    ));
    assert_eq!(registry.active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contexts_are_isolated_under_concurrency() {
    let (factory, registry) = registry();
    let registry = Arc::new(registry);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let ctx = ContextId::new(format!("worker-{i}"));
            let handle = registry.create(CapabilitySet::new(), endpoint()).await.unwrap();
            let id = handle.id();
            registry.bind(&ctx, handle).unwrap();
            tokio::task::yield_now().await;
            assert_eq!(registry.current(&ctx).unwrap().id(), id);
            registry.release(&ctx).await;
            id
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(registry.active(), 0);
    assert_eq!(factory.open_count(), 16);
    assert!(factory.transports().iter().all(|t| t.quit_calls() == 1));
}
