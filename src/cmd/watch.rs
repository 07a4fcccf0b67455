//! Live board command: `slotboard watch`.
//!
//! Connects the live-update channel, refetches on every push message and
//! redraws the board whenever the store changes. Reconnects follow the
//! `[reconnect]` policy.

use std::sync::Arc;

use anyhow::Result;
use console::{Term, style};
use tokio::sync::watch;
use tracing::{info, warn};

use slotboard::board::{ConnectionState, LiveChannel, MutationCoordinator};
use slotboard::client::{HttpBoardApi, WsTransport};
use slotboard::config::{ReconnectPolicy, SlotboardConfig};
use slotboard::errors::TransportError;

use super::board::render_board;

pub async fn cmd_watch(config: &SlotboardConfig) -> Result<()> {
    let api = Arc::new(HttpBoardApi::new(&config.server.api_url));
    let coordinator = Arc::new(MutationCoordinator::new(api, config.status_model()));
    let channel = Arc::new(LiveChannel::new());
    let transport = WsTransport::new(&config.server.ws_url);

    let follower = tokio::spawn(coordinator.clone().follow(channel.invalidations()));
    let resync = tokio::spawn(refresh_on_connect(
        coordinator.clone(),
        channel.subscribe_state(),
    ));
    let drawer = tokio::spawn(redraw_on_change(coordinator.clone(), channel.clone()));

    if let Err(e) = coordinator.refresh().await {
        warn!(error = %e, "Initial load failed; waiting for the live channel");
    }

    let result = tokio::select! {
        result = run_with_reconnect(&channel, &transport, config.reconnect) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };

    follower.abort();
    resync.abort();
    drawer.abort();
    result
}

/// Run the channel until the retry budget is spent. A connection that got
/// established resets the budget.
async fn run_with_reconnect(
    channel: &LiveChannel,
    transport: &WsTransport,
    policy: ReconnectPolicy,
) -> Result<()> {
    let mut failures = 0u32;
    loop {
        match channel.run(transport).await {
            Ok(()) => failures = 0,
            Err(TransportError::Connect { url, message }) => {
                failures += 1;
                warn!(%url, %message, attempt = failures, "Live channel connect failed");
            }
            Err(e) => {
                failures = 0;
                warn!(error = %e, "Live channel dropped");
            }
        }
        match policy.delay_for(failures.max(1)) {
            Some(delay) => {
                info!(delay_ms = delay.as_millis() as u64, "Reconnecting live channel");
                tokio::time::sleep(delay).await;
            }
            None => anyhow::bail!(
                "Gave up on the live channel after {} failed attempts",
                failures
            ),
        }
    }
}

/// Push messages sent while disconnected are lost, so every (re)connect
/// starts with a full refetch.
async fn refresh_on_connect(
    coordinator: Arc<MutationCoordinator>,
    mut states: watch::Receiver<ConnectionState>,
) {
    while states.changed().await.is_ok() {
        let connected = *states.borrow_and_update() == ConnectionState::Connected;
        if connected && let Err(e) = coordinator.refresh().await {
            warn!(error = %e, "Refresh after reconnect failed");
        }
    }
}

async fn redraw_on_change(coordinator: Arc<MutationCoordinator>, channel: Arc<LiveChannel>) {
    let term = Term::stdout();
    let mut changes = coordinator.subscribe();
    while changes.changed().await.is_ok() {
        changes.borrow_and_update();
        let _ = term.clear_screen();
        let status = if channel.is_connected() {
            style("live").green()
        } else {
            style("offline").red()
        };
        println!("{} [{}]\n", style("slotboard").bold(), status);
        print!("{}", render_board(&coordinator.columns()));
    }
}
