//! The HTTP surface, a thin `axum` transport in front of
//! [`crate::engine::Engine`]: three routes plus a liveness probe.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::chain::traits::ChainClient;
use crate::domain::Mode;
use crate::engine::{CreatePaymentRequest, Engine};
use crate::error::CreatePaymentError;
use crate::notifier::Notifier;
use crate::price::PriceOracle;
use crate::store::{AccountStore, PaymentStore};

/// Structured JSON error response: invoice creation returns `{"error": ...}`
/// on rejection so the caller can render it directly.
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<CreatePaymentError> for AppError {
    fn from(e: CreatePaymentError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    pub price_amount: f64,
    pub price_currency: String,
    pub wallet: String,
    pub mode: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_id: uuid::Uuid,
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_address: String,
    pub pay_amount: String,
    pub pay_currency: &'static str,
    pub payment_state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletNotifyBody {
    pub tx_id: String,
    pub mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNotifyBody {
    #[allow(dead_code)]
    pub block_hash: String,
    pub mode: String,
}

/// Builds the router for one [`Engine`] instance, generic over its
/// collaborators the same way the engine itself is — concrete only at the
/// binary's `main`.
pub fn router<A, C, S, N, P>(engine: Arc<Engine<A, C, S, N, P>>) -> Router
where
    A: AccountStore + 'static,
    C: ChainClient + 'static,
    S: PaymentStore + 'static,
    N: Notifier + 'static,
    P: PriceOracle + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/payment", post(create_payment::<A, C, S, N, P>))
        .route("/notify/wallet", post(notify_wallet::<A, C, S, N, P>))
        .route("/notify/block", post(notify_block::<A, C, S, N, P>))
        .with_state(engine)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn create_payment<A, C, S, N, P>(
    State(engine): State<Arc<Engine<A, C, S, N, P>>>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError>
where
    A: AccountStore,
    C: ChainClient,
    S: PaymentStore,
    N: Notifier,
    P: PriceOracle,
{
    let created = engine
        .create_payment(CreatePaymentRequest {
            merchant_wallet: body.wallet,
            mode: body.mode,
            price_amount: body.price_amount,
            price_currency: body.price_currency,
        })
        .await?;

    let response = CreatePaymentResponse {
        payment_id: created.payment.id,
        price_amount: created.payment.price_amount,
        price_currency: created.payment.price_currency.to_string(),
        pay_address: created.account.address,
        pay_amount: created.payment.pay_amount.to_string(),
        pay_currency: "BTC",
        payment_state: "Waiting".to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fire-and-forget: always 200, errors are logged inside the engine and
/// never surfaced to the caller.
async fn notify_wallet<A, C, S, N, P>(
    State(engine): State<Arc<Engine<A, C, S, N, P>>>,
    Json(body): Json<WalletNotifyBody>,
) -> StatusCode
where
    A: AccountStore,
    C: ChainClient,
    S: PaymentStore,
    N: Notifier,
    P: PriceOracle,
{
    let (Ok(mode), Ok(txid)) = (Mode::from_str(&body.mode), Txid::from_str(&body.tx_id)) else {
        warn!(mode = %body.mode, tx_id = %body.tx_id, "notify/wallet: unparseable body");
        return StatusCode::OK;
    };
    engine.handle_wallet_notify(mode, txid).await;
    StatusCode::OK
}

/// Fire-and-forget: always 200.
async fn notify_block<A, C, S, N, P>(
    State(engine): State<Arc<Engine<A, C, S, N, P>>>,
    Json(body): Json<BlockNotifyBody>,
) -> StatusCode
where
    A: AccountStore,
    C: ChainClient,
    S: PaymentStore,
    N: Notifier,
    P: PriceOracle,
{
    let Ok(mode) = Mode::from_str(&body.mode) else {
        warn!(mode = %body.mode, "notify/block: unparseable mode");
        return StatusCode::OK;
    };
    engine.handle_block_notify(mode).await;
    StatusCode::OK
}
