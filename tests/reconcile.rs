use wave_portal::test_helpers::{
    TestContext,
    test_account,
    wait_for,
};

#[tokio::test]
async fn events__wave_from_another_account_appears_live() {
    let ctx = TestContext::new();
    let mut app = ctx.app();
    app.connect().await.unwrap();
    let store = app.store();

    // when someone else waves
    ctx.chain.external_wave(test_account(0xbb), "gm");

    // then it lands in the session without a poll
    wait_for(&store, |s| s.wave_history.len() == 1).await;
    let snap = store.snapshot();
    assert_eq!(snap.wave_history[0].address, test_account(0xbb));
    assert_eq!(snap.wave_history[0].message, "gm");

    // the next poll sees the same wave again and keeps one copy
    app.refresh().await;
    let snap = store.snapshot();
    assert_eq!(snap.wave_count, 1);
    assert_eq!(snap.wave_history.len(), 1);
}

#[tokio::test]
async fn events__reconnecting_does_not_duplicate_deliveries() {
    let ctx = TestContext::new();
    let mut app = ctx.app();
    // given a session that was rebound, so the first subscription is stale
    app.connect().await.unwrap();
    app.connect().await.unwrap();
    let store = app.store();

    ctx.chain.external_wave(test_account(0xbb), "only once");

    wait_for(&store, |s| !s.wave_history.is_empty()).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(store.snapshot().wave_history.len(), 1);
}

#[tokio::test]
async fn refresh__repeated_polls_are_idempotent() {
    let ctx = TestContext::new();
    ctx.chain.seed_wave(test_account(0xb1), "one");
    ctx.chain.seed_wave(test_account(0xb2), "two");
    let mut app = ctx.app();
    app.connect().await.unwrap();

    app.refresh().await;
    app.refresh().await;

    let snap = app.store().snapshot();
    assert_eq!(snap.wave_count, 2);
    assert_eq!(snap.wave_history.len(), 2);
}

#[tokio::test]
async fn refresh__read_failure_is_transient() {
    let ctx = TestContext::new();
    ctx.chain.seed_wave(test_account(0xb1), "one");
    let mut app = ctx.app();
    app.connect().await.unwrap();
    let store = app.store();
    assert_eq!(store.snapshot().wave_count, 1);

    // given a wave that lands while the read endpoint is down
    ctx.chain.seed_wave(test_account(0xb2), "two");
    ctx.chain.set_fail_reads(true);

    // when a poll fails
    app.refresh().await;

    // then the mirror is left exactly as it was
    let snap = store.snapshot();
    assert_eq!(snap.wave_count, 1);
    assert_eq!(snap.wave_history.len(), 1);

    // and the next poll catches up
    ctx.chain.set_fail_reads(false);
    app.refresh().await;
    let snap = store.snapshot();
    assert_eq!(snap.wave_count, 2);
    assert_eq!(snap.wave_history.len(), 2);
}

#[tokio::test]
async fn full_session__connect_wave_and_observe() {
    let ctx = TestContext::new();
    ctx.chain.seed_wave(test_account(0xb1), "hello");
    ctx.chain.seed_wave(test_account(0xb2), "hey there");
    let mut app = ctx.app();

    // a first visit: nothing authorized yet, so the silent check stays idle
    assert_eq!(app.check_existing_connection().await.unwrap(), None);

    let account = app.connect().await.unwrap();
    assert_eq!(account, ctx.account());
    let store = app.store();
    assert_eq!(store.snapshot().wave_history.len(), 2);

    app.set_draft("hi");
    let tracker = app.tracker().unwrap();
    let task = tokio::spawn(async move { tracker.submit("hi").await });
    wait_for(&store, |s| s.mining).await;
    assert_eq!(store.snapshot().draft, "");

    ctx.chain.mine_next();
    task.await.unwrap().unwrap();
    wait_for(&store, |s| !s.mining).await;

    let snap = store.snapshot();
    assert_eq!(snap.wave_count, 3);
    assert_eq!(snap.wave_history.len(), 3);
    assert_eq!(snap.wave_history[2].address, account);
    assert_eq!(snap.wave_history[2].message, "hi");
    assert_eq!(snap.draft, "");
    assert!(!snap.mining);
    assert!(snap.pending.is_none());
}
