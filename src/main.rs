use color_eyre::eyre::Result;
use rand::Rng;
use std::{
    sync::OnceLock,
    time::Duration,
};
use tokio::time;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;
use wave_portal::{
    client::{
        PortalApp,
        PortalConfig,
    },
    contract::MAX_WAVE_LEN,
    test_helpers::{
        FakeChain,
        FakeGateway,
        portal_address,
        test_account,
    },
};

mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Logs go to a file; stdout belongs to the TUI.
fn init_tracing() {
    let appender = rolling::never("logs", "wave-portal.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    let _ = LOG_GUARD.set(guard);
}

const PEER_MESSAGES: &[&str] = &[
    "gm gm",
    "waving from the other side",
    "nice portal!",
    "o/",
    "hello from block space",
];

/// Other portal users, so the live event path has traffic.
fn spawn_peer_waves(chain: FakeChain) {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(9));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (peer, message) = {
                let mut rng = rand::rng();
                let peer = test_account(rng.random_range(0xb0..=0xbf));
                let message = PEER_MESSAGES[rng.random_range(0..PEER_MESSAGES.len())];
                (peer, message)
            };
            chain.external_wave(peer, message);
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let no_peers = std::env::args().any(|arg| arg == "--no-peers");

    // Demo environment: an in-process portal with a background miner.
    let chain = FakeChain::new();
    chain.seed_wave(test_account(0xb3), "gm! first wave on this portal");
    chain.seed_wave(test_account(0xb7), "o/");
    let _miner = chain.spawn_auto_miner(Duration::from_millis(1500));
    if !no_peers {
        spawn_peer_waves(chain.clone());
    }

    let gateway = FakeGateway::new(chain.clone(), test_account(0xa1));
    let mut app = PortalApp::new(gateway, PortalConfig::new(portal_address()))?;
    app.check_existing_connection().await?;

    let mut ui_state = ui::UiState::default();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut app, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    app: &mut PortalApp<FakeGateway>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let store = app.store();
    let mut rx = store.subscribe();
    let mut ticker = time::interval(Duration::from_secs(2));
    ui::draw(ui_state, &rx.borrow_and_update().clone())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                app.refresh().await;
                ui::draw(ui_state, &rx.borrow_and_update().clone())?;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                ui::draw(ui_state, &rx.borrow_and_update().clone())?;
            }
            event = ui::next_event(ui_state, app.connected()) => {
                match event? {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Connect => {
                        // Failures are surfaced through the store's error log.
                        let _ = app.connect().await;
                    }
                    ui::UserEvent::Disconnect => app.disconnect(),
                    ui::UserEvent::Submit => {
                        app.spawn_submit();
                    }
                    ui::UserEvent::Input(c) => {
                        let mut draft = store.snapshot().draft;
                        if draft.chars().count() < MAX_WAVE_LEN {
                            draft.push(c);
                            app.set_draft(draft);
                        }
                    }
                    ui::UserEvent::Backspace => {
                        let mut draft = store.snapshot().draft;
                        draft.pop();
                        app.set_draft(draft);
                    }
                    ui::UserEvent::Redraw => {
                        ui::draw(ui_state, &rx.borrow_and_update().clone())?;
                    }
                }
            }
        }
    }
    Ok(())
}
