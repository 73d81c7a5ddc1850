//! Process configuration.
//!
//! One `clap::Parser` struct with an `env = "..."` attribute on every field,
//! so every variable can be set on the command line or via the environment
//! interchangeably. A `.env` file is loaded via `dotenvy` before parsing, in
//! `main`.

use clap::Parser;

/// Default BTC/kB fee used when `estimatesmartfee` reports insufficient
/// data.
pub const FALLBACK_FEE_RATE_BTC_PER_KB: f64 = 0.00002986;

#[derive(Parser, Clone, Debug)]
#[command(name = "bitcoin-gatewayd", about = "Non-custodial Bitcoin payment gateway")]
pub struct Config {
    /// Port the HTTP API listens on.
    #[arg(long, env = "SERVER_PORT", default_value_t = 9001)]
    pub server_port: u16,

    /// Postgres host.
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Postgres user.
    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Postgres password.
    #[arg(long, env = "DB_PASSWORD", default_value = "")]
    pub db_password: String,

    /// Postgres database name.
    #[arg(long, env = "DB_NAME", default_value = "bitcoin")]
    pub db_name: String,

    /// Postgres port.
    #[arg(long, env = "DB_PORT", default_value = "5434")]
    pub db_port: String,

    /// Testnet Bitcoin Core RPC host:port.
    #[arg(long, env = "BITCOIN_TEST_HOST", default_value = "localhost:18332")]
    pub bitcoin_test_host: String,

    /// Testnet Bitcoin Core RPC user.
    #[arg(long, env = "BITCOIN_TEST_USER", default_value = "user")]
    pub bitcoin_test_user: String,

    /// Testnet Bitcoin Core RPC password.
    #[arg(long, env = "BITCOIN_TEST_PASS", default_value = "")]
    pub bitcoin_test_pass: String,

    /// Testnet wallet passphrase, used to unlock for signing forwards.
    #[arg(long, env = "TEST_WALLET_PASSPHRASE", default_value = "")]
    pub test_wallet_passphrase: String,

    /// Testnet service change address: the service-owned address that
    /// receives the forwarding transaction's change.
    #[arg(long, env = "TEST_CHANGE_ADDRESS", default_value = "")]
    pub test_change_address: String,

    /// Mainnet Bitcoin Core RPC host:port.
    #[arg(long, env = "BITCOIN_MAIN_HOST", default_value = "localhost:8332")]
    pub bitcoin_main_host: String,

    /// Mainnet Bitcoin Core RPC user.
    #[arg(long, env = "BITCOIN_MAIN_USER", default_value = "user")]
    pub bitcoin_main_user: String,

    /// Mainnet Bitcoin Core RPC password.
    #[arg(long, env = "BITCOIN_MAIN_PASS", default_value = "")]
    pub bitcoin_main_pass: String,

    /// Mainnet wallet passphrase, used to unlock for signing forwards.
    #[arg(long, env = "MAIN_WALLET_PASSPHRASE", default_value = "")]
    pub main_wallet_passphrase: String,

    /// Mainnet service change address.
    #[arg(long, env = "MAIN_CHANGE_ADDRESS", default_value = "")]
    pub main_change_address: String,

    /// Base URL of the fiat->BTC price-conversion proxy.
    #[arg(long, env = "PROXY_BASE_URL", default_value = "http://localhost:8001/api")]
    pub proxy_base_url: String,

    /// Base URL of the merchant backend that receives webhooks.
    #[arg(
        long,
        env = "BACKEND_BASE_URL",
        default_value = "http://localhost:8000/api/internal"
    )]
    pub backend_base_url: String,

    /// Percentage of `payAmount` forwarded to the merchant.
    #[arg(long, env = "FORWARD_AMOUNT_PERCENTAGE", default_value_t = 99)]
    pub forward_amount_percentage: u8,

    /// BTC/kB fee used when `estimatesmartfee` has insufficient data.
    #[arg(long, env = "FALLBACK_FEE", default_value_t = FALLBACK_FEE_RATE_BTC_PER_KB)]
    pub fallback_fee: f64,

    /// Confirmations required for Confirmed/Finished transitions.
    #[arg(long, env = "MINIMUM_CONFIRMATIONS", default_value_t = 6)]
    pub minimum_confirmations: u32,

    /// If enabled, logs are emitted as JSON instead of the default ansi
    /// human-readable format.
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    pub fn read() -> Config {
        Config::parse()
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }
}
