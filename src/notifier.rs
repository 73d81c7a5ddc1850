//! Fire-and-forget webhook to the merchant backend on every state
//! transition: a single bounded PUT with no retry loop — a failed notify is
//! the caller's problem to retry on the next trigger.

use std::future::Future;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::Serialize;
use tracing::trace;

use crate::domain::{PaymentId, PaymentStateKind, Sats};
use crate::error::NotifyError;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of the `PUT {BackendBaseUrl}/payment/webhook` call.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub payment_id: PaymentId,
    pub pay_amount: Sats,
    pub pay_currency: &'static str,
    pub actually_paid: Sats,
    pub payment_state: PaymentStateKind,
    pub tx_hash: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, payload: &WebhookPayload) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Reqwest-backed [`Notifier`], one instance per process (both modes share
/// the same backend base URL).
#[derive(Clone)]
pub struct HttpNotifier {
    base_url: String,
    client: ReqwestClient,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = ReqwestClient::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .expect("reqwest client builder");
        Self { base_url: base_url.into(), client }
    }
}

impl Notifier for HttpNotifier {
    async fn notify(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let url = format!("{}/payment/webhook", self.base_url);
        trace!(%url, payment_id = %payload.payment_id, state = %payload.payment_state, "sending webhook");

        let response = self
            .client
            .put(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Records every payload handed to it; never fails. Used by engine
    /// unit tests to assert a webhook was (or wasn't) sent.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<WebhookPayload>>,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }
}
