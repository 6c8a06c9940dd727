use anyhow::Result;
use asset_swap::{
    config::OracleConfig,
    feed::{self, PriceFeed},
    oracle::{
        AssetSpecifier, PriceOracleService, QuoteRateRequest, QuoteRateResponse, TransactionType,
    },
    utils,
};
use std::time::Duration;

const HEARTBEAT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let cfg = OracleConfig::from_env()?;
    tracing::info!(
        source = ?cfg.price_source,
        ticker = %cfg.ticker,
        spread_bips = cfg.spread_bips,
        decimal_display = cfg.decimal_display,
        max_asset_trade_amount = cfg.max_asset_trade_amount,
        allowed_assets = cfg.allowed_asset_ids.len(),
        "[INIT] price oracle starting"
    );

    let source = feed::source_from_config(&cfg)?;
    let price_feed = PriceFeed::new(source, cfg.spread_bips);
    let prices = price_feed.cell();
    let oracle = PriceOracleService::new(&cfg, prices.clone());
    let feed_task = price_feed.spawn(cfg.refresh_interval, cfg.retry_interval);
    tracing::info!(
        refresh_secs = cfg.refresh_interval.as_secs(),
        retry_secs = cfg.retry_interval.as_secs(),
        "[INIT] price feed started"
    );

    // Heartbeat: what the oracle would quote right now for either side.
    let probe_asset = cfg
        .allowed_asset_ids
        .first()
        .cloned()
        .unwrap_or_else(|| "11".repeat(32));
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
        loop {
            ticker.tick().await;
            let snapshot = prices.read();
            if snapshot.is_empty() {
                tracing::info!("[HEARTBEAT] waiting for first reference price");
                continue;
            }
            let mut rates = Vec::with_capacity(2);
            for ty in [TransactionType::Purchase, TransactionType::Sale] {
                let req = QuoteRateRequest {
                    transaction_type: ty,
                    subject_asset: Some(AssetSpecifier::from_asset_id_str(probe_asset.clone())),
                    subject_asset_max_amount: 0,
                    payment_asset: Some(AssetSpecifier::btc()),
                    payment_asset_max_amount: 0,
                };
                match oracle.quote_rate(&req) {
                    Ok(QuoteRateResponse::Ok(r)) => {
                        rates.push(format!("{ty:?}={}", r.subject_asset_rate))
                    }
                    Ok(QuoteRateResponse::Rejected(why)) => rates.push(format!("{ty:?}: {why}")),
                    Err(e) => rates.push(format!("{ty:?}: {e}")),
                }
            }
            tracing::info!(
                index = snapshot.index,
                ask = snapshot.ask,
                bid = snapshot.bid,
                rates = ?rates,
                "[HEARTBEAT] oracle rates"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("[SHUTDOWN] ctrl-c received, stopping");
    feed_task.abort();
    heartbeat.abort();
    Ok(())
}
