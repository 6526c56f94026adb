use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt};

use aleph_margin::core::{AccountId, Config, InboundEvent, MatchingStub};
use aleph_margin::engine::TradingEngine;
use aleph_margin::execution::{PaperMatcher, matching};
use aleph_margin::feeds::{Inbound, ipc};

/// Run the paper matcher over all open orders and feed its fills back in.
fn paper_sweep(engine: &TradingEngine, matcher: &dyn MatchingStub) {
    let orders = engine.open_orders();
    for fill in matching::sweep(matcher, &orders, engine.prices()) {
        engine.handle(InboundEvent::Fill(fill));
    }
}

fn dispatch(engine: &TradingEngine, inbound: Inbound) {
    match inbound {
        Inbound::Event(event) => engine.handle(event),
        Inbound::Place(request) => match engine.place_order(&request) {
            Ok(order) => tracing::debug!("Accepted order {}", order.id),
            Err(e) => tracing::warn!("Placement refused: {}", e),
        },
        Inbound::Cancel { account, order_id } => {
            if engine.cancel_order(&account, &order_id).is_none() {
                tracing::debug!("Cancel of {} was a no-op", order_id);
            }
        }
        Inbound::Close { account, position_id, amount } => {
            match engine.close_position(&account, &position_id, amount) {
                Ok(order) => tracing::debug!("Closed via order {}", order.id),
                Err(e) => tracing::warn!("Close refused: {}", e),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Logger
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,aleph_margin=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("Aleph Margin engine starting...");

    // 2. Config
    let config = match std::env::var("ALEPH_CONFIG") {
        Ok(path) => Config::load(&PathBuf::from(path))?,
        Err(_) => Config::load_default(),
    };

    // 3. Engine + account
    let engine = TradingEngine::from_config(&config);
    engine.open_account(
        AccountId::new(config.account.id.clone()),
        config.account.quote_asset.clone(),
        config.account.initial_balance,
    )?;

    let matcher = config.paper.enabled.then(PaperMatcher::new);
    if let Some(m) = &matcher {
        tracing::info!("Paper matching enabled ({})", m.name());
    }

    // 4. Inbound socket
    let (tx, rx) = flume::unbounded::<Inbound>();
    let socket_path = config.feed.socket_path.clone();
    tokio::spawn(async move {
        if let Err(e) = ipc::listen(socket_path, tx).await {
            tracing::error!("IPC listener stopped: {}", e);
        }
    });

    let events = engine.subscribe();

    // 5. Event loop
    loop {
        tokio::select! {
            inbound = rx.recv_async() => {
                let Ok(inbound) = inbound else {
                    tracing::warn!("Inbound channel closed");
                    break;
                };
                let sweep = matches!(inbound, Inbound::Place(_) | Inbound::Event(InboundEvent::Tick(_)));
                dispatch(&engine, inbound);
                if let (true, Some(m)) = (sweep, &matcher) {
                    paper_sweep(&engine, m);
                }
            }
            event = events.recv_async() => {
                if let Some(event) = event {
                    match serde_json::to_string(&event) {
                        Ok(json) => tracing::info!(target: "aleph_margin::events", "{}", json),
                        Err(e) => tracing::warn!("Unserializable event: {}", e),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    if let Some(snapshot) = engine.snapshot(&AccountId::new(config.account.id.clone())) {
        tracing::info!(
            "Final balance {} {}, {} open positions, unrealized {}",
            snapshot.available,
            snapshot.asset,
            snapshot.positions.len(),
            snapshot.total_unrealized_pnl
        );
    }

    Ok(())
}
