use thiserror::Error;

/// Errors surfaced by the Bitcoin Core JSON-RPC client.
///
/// Mirrors the shape of a hand-rolled JSON-RPC client: one variant per
/// failure class so callers can decide what is worth retrying.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("could not build request: {0}")]
    ReqBuilder(String),

    #[error("http status {0}: {1}")]
    Status(u16, String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("request error: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("could not parse response body: {0}")]
    Parse(String),

    #[error("bitcoind returned error {0}: {1}")]
    Server(i64, String),

    #[error("empty result for method that must return data")]
    EmptyResult,

    #[error("invalid parameter: {0}")]
    Param(String),

    #[error("exceeded {0} retries")]
    MaxRetriesExceeded(u8),

    #[error("not all inputs were signed")]
    NotAllInputsSigned,

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Parse(e.to_string())
    }
}

/// Errors surfaced by the payment store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("no row found")]
    NotFound,

    #[error("stale write: expected current state {expected}, found {found}")]
    Conflict {
        expected: uuid::Uuid,
        found: uuid::Uuid,
    },
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Errors surfaced by the merchant-backend webhook client.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request error: {0}")]
    Request(String),

    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Errors surfaced by the fiat-to-BTC price oracle client.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price oracle request error: {0}")]
    Request(String),

    #[error("price oracle returned status {0}")]
    Status(u16),
}

/// Errors surfaced by the address pool.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AccountError> for CreatePaymentError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Chain(e) => CreatePaymentError::Chain(e),
            AccountError::Store(e) => CreatePaymentError::Store(e),
        }
    }
}

/// Top-level error returned by invoice creation.
///
/// Only this path is user-facing (spec: "invoice creation returns a
/// structured error message; all other paths are opaque to the outside
/// world"); everything else is logged and dropped by the engine.
#[derive(Debug, Error)]
pub enum CreatePaymentError {
    #[error("unknown mode")]
    UnknownMode,

    #[error("unknown price currency")]
    UnknownCurrency,

    #[error("pay amount is too low")]
    PayAmountTooLow,

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Price(#[from] PriceError),
}
