//! Binary entrypoint: loads config, connects both Bitcoin Core RPC clients,
//! builds the Postgres store, and serves the HTTP surface in front of the
//! lifecycle engine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bitcoin_gateway::account::AccountPool;
use bitcoin_gateway::chain::client::{Auth, RpcChainClient};
use bitcoin_gateway::config::Config;
use bitcoin_gateway::domain::Mode;
use bitcoin_gateway::engine::Engine;
use bitcoin_gateway::http;
use bitcoin_gateway::logger;
use bitcoin_gateway::notifier::HttpNotifier;
use bitcoin_gateway::price::HttpPriceOracle;
use bitcoin_gateway::store::pg::{build_pool, run_migration, PgStore};
use tracing::{info, metadata::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::read();

    logger::init_tracing(LevelFilter::INFO, config.json_logs)
        .context("failed to initialize logging")?;

    info!("starting bitcoin-gatewayd");

    let pool = build_pool(&config.database_url()).context("failed to build Postgres pool")?;
    {
        let mut conn = pool.get().context("failed to check out a connection for migrations")?;
        run_migration(&mut conn).map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    }
    let store = PgStore::new(pool);

    let test_client = RpcChainClient::connect(
        format!("http://{}", config.bitcoin_test_host),
        Auth::UserPass(config.bitcoin_test_user.clone(), config.bitcoin_test_pass.clone()),
        config.test_wallet_passphrase.clone(),
        None,
        None,
    )
    .await
    .context("failed to connect to testnet bitcoind")?;

    let main_client = RpcChainClient::connect(
        format!("http://{}", config.bitcoin_main_host),
        Auth::UserPass(config.bitcoin_main_user.clone(), config.bitcoin_main_pass.clone()),
        config.main_wallet_passphrase.clone(),
        None,
        None,
    )
    .await
    .context("failed to connect to mainnet bitcoind")?;

    let mut chains = HashMap::new();
    chains.insert(Mode::Test, test_client.clone());
    chains.insert(Mode::Main, main_client.clone());

    let mut change_addresses = HashMap::new();
    change_addresses.insert(Mode::Test, config.test_change_address.clone());
    change_addresses.insert(Mode::Main, config.main_change_address.clone());

    let accounts = AccountPool::new(store.clone());

    let notifier = HttpNotifier::new(config.backend_base_url.clone());
    let price_oracle = HttpPriceOracle::new(config.proxy_base_url.clone());

    let engine = Arc::new(Engine::new(
        accounts,
        chains,
        change_addresses,
        store,
        notifier,
        price_oracle,
        config.forward_amount_percentage,
        config.fallback_fee,
        config.minimum_confirmations,
    ));

    let app = http::router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
