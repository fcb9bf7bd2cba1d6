use wave_portal::{
    Error,
    client::{
        PortalApp,
        PortalConfig,
    },
    test_helpers::{
        FakeChain,
        FakeGateway,
        TestContext,
        portal_address,
        test_account,
        wait_for,
    },
};

#[tokio::test]
async fn connect__resolves_account_and_loads_history() {
    let ctx = TestContext::new();
    // given
    ctx.chain.seed_wave(test_account(0xb1), "hello");
    ctx.chain.seed_wave(test_account(0xb2), "hey there");
    let mut app = ctx.app();

    // when
    let account = app.connect().await.unwrap();

    // then
    assert_eq!(account, ctx.account());
    let snap = app.store().snapshot();
    assert!(snap.connected);
    assert_eq!(snap.account, Some(account));
    assert_eq!(snap.wave_count, 2);
    assert_eq!(snap.wave_history.len(), 2);
}

#[tokio::test]
async fn connect__fails_when_no_provider_is_injected() {
    let chain = FakeChain::new();
    let gateway = FakeGateway::unavailable(chain);
    let mut app = PortalApp::new(gateway, PortalConfig::new(portal_address())).unwrap();

    let err = app.connect().await.unwrap_err();

    assert!(matches!(err, Error::NoProvider));
    let snap = app.store().snapshot();
    assert!(!snap.connected);
    assert!(!snap.errors.is_empty());
}

#[tokio::test]
async fn connect__user_rejection_is_terminal_but_retryable() {
    let ctx = TestContext::new();
    let mut app = ctx.app();
    // given the user declines the first prompt
    ctx.gateway.set_reject(true);

    let err = app.connect().await.unwrap_err();
    assert!(matches!(err, Error::UserRejected));
    assert!(!app.store().snapshot().connected);
    assert_eq!(ctx.gateway.prompt_count(), 1);

    // when the user tries again and accepts
    ctx.gateway.set_reject(false);
    let account = app.connect().await.unwrap();

    // then
    assert_eq!(account, ctx.account());
    assert!(app.store().snapshot().connected);
    assert_eq!(ctx.gateway.prompt_count(), 2);
}

#[tokio::test]
async fn check_existing_connection__binds_authorized_account_without_prompting() {
    let chain = FakeChain::new();
    chain.seed_wave(test_account(0xb1), "old wave");
    let gateway = FakeGateway::pre_authorized(chain.clone(), test_account(0xa1));
    let mut app = PortalApp::new(gateway.clone(), PortalConfig::new(portal_address())).unwrap();

    let found = app.check_existing_connection().await.unwrap();

    assert_eq!(found, Some(test_account(0xa1)));
    assert_eq!(gateway.prompt_count(), 0);
    let snap = app.store().snapshot();
    assert!(snap.connected);
    assert_eq!(snap.wave_history.len(), 1);
}

#[tokio::test]
async fn check_existing_connection__no_authorized_account_is_not_an_error() {
    let ctx = TestContext::new();
    let mut app = ctx.app();

    let found = app.check_existing_connection().await.unwrap();

    assert_eq!(found, None);
    assert!(!app.store().snapshot().connected);
    assert_eq!(ctx.gateway.prompt_count(), 0);
}

#[tokio::test]
async fn disconnect__clears_session_and_stops_event_delivery() {
    let ctx = TestContext::new();
    let mut app = ctx.app();
    app.connect().await.unwrap();
    let store = app.store();

    // sanity: events are delivered while connected
    ctx.chain.external_wave(test_account(0xb9), "first");
    wait_for(&store, |s| s.wave_history.len() == 1).await;

    // when
    app.disconnect();
    ctx.chain.external_wave(test_account(0xb9), "second");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // then: the subscription died with the binding
    let snap = store.snapshot();
    assert!(!snap.connected);
    assert_eq!(snap.account, None);
    assert_eq!(snap.wave_history.len(), 1);
}
