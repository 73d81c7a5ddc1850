//! The lifecycle engine. Owns the three public operations the HTTP surface
//! exposes — `create_payment`, `handle_wallet_notify`, `handle_block_notify`
//! — and drives the payment state machine between them.
//!
//! Generic over every collaborator trait (account pool, chain client per
//! mode, payment store, notifier, price oracle) and concrete only at the
//! wiring point in the binary. Unit tests at the bottom exercise the seed
//! scenarios (happy path, expiry, partial payment) against the in-memory/stub
//! doubles.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use bitcoin::{Address, NetworkUnchecked, Txid};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::AccountPool;
use crate::amount::{forward_amount, is_payment_viable};
use crate::chain::traits::ChainClient;
use crate::chain::types::TransactionCategory;
use crate::domain::{Account, FiatCurrency, Mode, Payment, PaymentState, PaymentStateKind, Sats};
use crate::error::{ChainError, CreatePaymentError, StoreError};
use crate::notifier::{Notifier, WebhookPayload};
use crate::price::PriceOracle;
use crate::store::{AccountStore, PaymentStore};

/// How long a payment sits in Waiting/PartiallyPaid before the expiry sweep
/// reclaims it.
const EXPIRY_AFTER: Duration = Duration::minutes(15);

/// How many recent wallet transactions orphan-broadcast recovery scans
/// before giving up.
const RECOVERY_SCAN_COUNT: u32 = 1000;

/// Confirmation target, in blocks, for the fee estimate the viability check
/// is computed against.
const FEE_ESTIMATE_CONF_TARGET: u16 = 6;

/// Request payload for invoice creation. Mode and currency arrive as raw
/// strings — parsing them is this module's job, not the transport layer's,
/// since `CreatePaymentError::UnknownMode`/`UnknownCurrency` are domain
/// errors the caller must see regardless of which transport fronts the
/// engine.
#[derive(Clone, Debug)]
pub struct CreatePaymentRequest {
    pub merchant_wallet: String,
    pub mode: String,
    pub price_amount: f64,
    pub price_currency: String,
}

/// Everything a successful `create_payment` call hands back to the caller:
/// the new payment row and the deposit account it was assigned.
#[derive(Clone, Debug)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub account: Account,
}

/// Errors internal sweep/notify steps can fail with. Deliberately narrower
/// than [`CreatePaymentError`] — these paths are never user-facing, so a
/// notify failure is handled inline via [`Engine::notify_best_effort`]
/// rather than modeled as a variant here.
#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The core of the gateway: create invoices, react to wallet notifications,
/// and sweep the block-notify state transitions.
pub struct Engine<A, C, S, N, P>
where
    A: AccountStore,
    C: ChainClient,
    S: PaymentStore,
    N: Notifier,
    P: PriceOracle,
{
    accounts: AccountPool<A>,
    chains: HashMap<Mode, C>,
    change_addresses: HashMap<Mode, String>,
    store: S,
    notifier: N,
    price_oracle: P,
    forward_percent: u8,
    fallback_fee_btc_per_kb: f64,
    minimum_confirmations: u32,
}

impl<A, C, S, N, P> Engine<A, C, S, N, P>
where
    A: AccountStore,
    C: ChainClient,
    S: PaymentStore,
    N: Notifier,
    P: PriceOracle,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: AccountPool<A>,
        chains: HashMap<Mode, C>,
        change_addresses: HashMap<Mode, String>,
        store: S,
        notifier: N,
        price_oracle: P,
        forward_percent: u8,
        fallback_fee_btc_per_kb: f64,
        minimum_confirmations: u32,
    ) -> Self {
        Self {
            accounts,
            chains,
            change_addresses,
            store,
            notifier,
            price_oracle,
            forward_percent,
            fallback_fee_btc_per_kb,
            minimum_confirmations,
        }
    }

    fn chain(&self, mode: Mode) -> &C {
        self.chains.get(&mode).unwrap_or_else(|| panic!("no chain client configured for mode {mode}"))
    }

    fn change_address(&self, mode: Mode) -> Result<Address<NetworkUnchecked>, StepError> {
        let raw = self
            .change_addresses
            .get(&mode)
            .unwrap_or_else(|| panic!("no change address configured for mode {mode}"));
        parse_address(raw)
    }

    // ---- create_payment ---------------------------------------------

    pub async fn create_payment(&self, request: CreatePaymentRequest) -> Result<CreatedPayment, CreatePaymentError> {
        let mode = Mode::from_str(&request.mode).map_err(|_| CreatePaymentError::UnknownMode)?;
        let currency =
            FiatCurrency::from_str(&request.price_currency).map_err(|_| CreatePaymentError::UnknownCurrency)?;

        let price_btc = self.price_oracle.price_to_btc(request.price_amount, currency, mode).await?;
        let pay_amount = crate::amount::btc_to_sats(price_btc)
            .map_err(|e| CreatePaymentError::Chain(ChainError::Other(e.to_string())))?;

        let fee_rate = self
            .chain(mode)
            .estimate_smart_fee(FEE_ESTIMATE_CONF_TARGET)
            .await?
            .feerate
            .unwrap_or(self.fallback_fee_btc_per_kb);

        if !is_payment_viable(pay_amount, fee_rate, self.forward_percent) {
            return Err(CreatePaymentError::PayAmountTooLow);
        }

        let account = self.accounts.allocate(mode, self.chain(mode)).await?;

        let now = OffsetDateTime::now_utc();
        let initial_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            state: PaymentStateKind::Waiting,
            pay_amount,
            amount_received: Sats::ZERO,
            created_at: now,
        };
        let payment = Payment {
            id: initial_state.payment_id,
            account_id: account.id,
            merchant_wallet: request.merchant_wallet,
            mode,
            price_amount: request.price_amount,
            price_currency: currency,
            created_at: now,
            pay_amount,
            current_state_id: initial_state.id,
            forwarding_tx_hash: None,
            forwarding_confirmations: None,
            received_confirmations: None,
        };

        let payment = self.store.create(payment, initial_state).await?;
        info!(payment_id = %payment.id, %mode, address = %account.address, "payment created");
        Ok(CreatedPayment { payment, account })
    }

    // ---- handle_wallet_notify -----------------------------------------

    /// Public entry point: logs and drops every error, since a wallet-notify
    /// webhook has no caller worth surfacing a failure to.
    pub async fn handle_wallet_notify(&self, mode: Mode, txid: Txid) {
        if let Err(e) = self.try_handle_wallet_notify(mode, txid).await {
            warn!(%txid, %mode, error = %e, "wallet notify failed");
        }
    }

    async fn try_handle_wallet_notify(&self, mode: Mode, txid: Txid) -> Result<(), StepError> {
        let tx = self.chain(mode).get_transaction(&txid).await?;
        // We only react to the first time a deposit tx is seen, not to every
        // confirmation bump, and never to a self-send (negative amount).
        if tx.confirmations != 0 || tx.amount.to_sat() < 0 {
            return Ok(());
        }
        if tx.category_of(&tx.details) != Some(TransactionCategory::Receive) {
            return Ok(());
        }

        let Some(detail) = tx.details.iter().find(|d| d.category == TransactionCategory::Receive) else {
            return Ok(());
        };
        let address = detail.address.clone().assume_checked().to_string();

        // `find_current_by_address` only ever returns a payment in
        // {Waiting, PartiallyPaid}, so a payment already advanced to Paid by
        // an earlier wallet-notify naturally drops out here — no separate
        // idempotency guard is needed.
        let Some(payment) = self.store.find_current_by_address(&address).await? else {
            return Ok(());
        };

        let account = self.accounts.get(payment.account_id).await?;
        let from_address = parse_address(&account.address)?;
        let unspent = self.chain(mode).list_unspent_for_address(&from_address, 0).await?;
        let received = sum_unspent(&unspent).checked_sub(account.remainder);

        let new_kind =
            if received >= payment.pay_amount { PaymentStateKind::Paid } else { PaymentStateKind::PartiallyPaid };

        let new_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            state: new_kind,
            pay_amount: payment.pay_amount,
            amount_received: received,
            created_at: OffsetDateTime::now_utc(),
        };
        let expected = payment.current_state_id;
        let mut updated = payment.clone();
        updated.current_state_id = new_state.id;
        updated.received_confirmations = Some(0);

        let persisted = self.store.update(updated, new_state, expected).await?;
        self.notify_best_effort(&persisted, new_kind, received, None).await;
        Ok(())
    }

    // ---- handle_block_notify -------------------------------------------

    /// Public entry point: runs the four sweeps for `mode`, logging (never
    /// propagating) any sweep-level failure, and — within each sweep —
    /// continuing past a single payment's failure rather than aborting the
    /// batch, so one bad payment never starves the rest of the sweep.
    pub async fn handle_block_notify(&self, mode: Mode) {
        if let Err(e) = self.sweep_paid(mode).await {
            warn!(%mode, error = %e, "sweep_paid failed");
        }
        if let Err(e) = self.sweep_confirmed(mode).await {
            warn!(%mode, error = %e, "sweep_confirmed failed");
        }
        if let Err(e) = self.sweep_forwarded(mode).await {
            warn!(%mode, error = %e, "sweep_forwarded failed");
        }
        if let Err(e) = self.sweep_expired(mode).await {
            warn!(%mode, error = %e, "sweep_expired failed");
        }
    }

    /// Sweep 1: Paid -> Confirmed, then build and broadcast the forward.
    async fn sweep_paid(&self, mode: Mode) -> Result<(), StepError> {
        let payments = self.store.find_by_current_state(PaymentStateKind::Paid, mode).await?;
        for payment in payments {
            if let Err(e) = self.advance_paid(&payment, mode).await {
                warn!(payment_id = %payment.id, error = %e, "advance_paid failed");
            }
        }
        Ok(())
    }

    async fn advance_paid(&self, payment: &Payment, mode: Mode) -> Result<(), StepError> {
        let account = self.accounts.get(payment.account_id).await?;
        let from_address = parse_address(&account.address)?;

        let unspent = self.chain(mode).list_unspent_for_address(&from_address, self.minimum_confirmations).await?;
        let received = sum_unspent(&unspent).checked_sub(account.remainder);
        if received < payment.pay_amount {
            return Ok(());
        }

        let confirmed_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            state: PaymentStateKind::Confirmed,
            pay_amount: payment.pay_amount,
            amount_received: received,
            created_at: OffsetDateTime::now_utc(),
        };
        let expected = payment.current_state_id;
        let mut updated = payment.clone();
        updated.current_state_id = confirmed_state.id;
        updated.received_confirmations = Some(self.minimum_confirmations as i64);

        let persisted = self.store.update(updated, confirmed_state, expected).await?;
        self.notify_best_effort(&persisted, PaymentStateKind::Confirmed, received, None).await;

        let forward = forward_amount(payment.pay_amount, self.forward_percent);
        let merchant_address = parse_address(&persisted.merchant_wallet)?;
        let change_address = self.change_address(mode)?;

        let txid = self
            .chain(mode)
            .build_and_send_forward(&from_address, &merchant_address, forward, &change_address, self.minimum_confirmations)
            .await?;

        let mut with_forward = persisted.clone();
        with_forward.forwarding_tx_hash = Some(txid.to_string());
        with_forward.forwarding_confirmations = Some(0);
        self.store.update_fields(with_forward, persisted.current_state_id).await?;
        Ok(())
    }

    /// Sweep 2: Confirmed -> Forwarded, with orphan-broadcast recovery.
    async fn sweep_confirmed(&self, mode: Mode) -> Result<(), StepError> {
        let payments = self.store.find_by_current_state(PaymentStateKind::Confirmed, mode).await?;
        for payment in payments {
            if let Err(e) = self.advance_confirmed(&payment, mode).await {
                warn!(payment_id = %payment.id, error = %e, "advance_confirmed failed");
            }
        }
        Ok(())
    }

    async fn advance_confirmed(&self, payment: &Payment, mode: Mode) -> Result<(), StepError> {
        let mut payment = payment.clone();

        if payment.forwarding_tx_hash.is_none() {
            let account = self.accounts.get(payment.account_id).await?;
            let from_address = parse_address(&account.address)?;
            let unspent =
                self.chain(mode).list_unspent_for_address(&from_address, self.minimum_confirmations).await?;
            let available = sum_unspent(&unspent).checked_sub(account.remainder);
            let forward = forward_amount(payment.pay_amount, self.forward_percent);

            if available >= payment.pay_amount {
                let merchant_address = parse_address(&payment.merchant_wallet)?;
                let change_address = self.change_address(mode)?;
                let txid = self
                    .chain(mode)
                    .build_and_send_forward(
                        &from_address,
                        &merchant_address,
                        forward,
                        &change_address,
                        self.minimum_confirmations,
                    )
                    .await?;

                payment.forwarding_tx_hash = Some(txid.to_string());
                payment.forwarding_confirmations = Some(0);
                self.store.update_fields(payment, payment.current_state_id).await?;
                // Freshly broadcast: skip the confirmation check this round.
                return Ok(());
            } else if available == Sats::ZERO {
                match self.recover_forwarding_txid(&payment.merchant_wallet, mode, forward).await? {
                    Some(adopted) => {
                        let expected = payment.current_state_id;
                        payment.forwarding_tx_hash = Some(adopted.to_string());
                        payment = self.store.update_fields(payment, expected).await?;
                    }
                    None => return Ok(()),
                }
            } else {
                // Funds present but still short of pay_amount: retry next block.
                return Ok(());
            }
        }

        let Some(tx_hash) = payment.forwarding_tx_hash.clone() else { return Ok(()) };
        let txid =
            Txid::from_str(&tx_hash).map_err(|e| ChainError::MalformedResponse(e.to_string()))?;
        let tx = self.chain(mode).get_transaction(&txid).await?;
        if tx.confirmations <= 0 {
            return Ok(());
        }

        let forwarded_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            state: PaymentStateKind::Forwarded,
            pay_amount: payment.pay_amount,
            amount_received: payment.pay_amount,
            created_at: OffsetDateTime::now_utc(),
        };
        let expected = payment.current_state_id;
        let mut updated = payment.clone();
        updated.current_state_id = forwarded_state.id;
        updated.forwarding_confirmations = Some(tx.confirmations);

        let persisted = self.store.update(updated, forwarded_state, expected).await?;
        self.notify_best_effort(&persisted, PaymentStateKind::Forwarded, payment.pay_amount, payment.forwarding_tx_hash.clone())
            .await;
        Ok(())
    }

    /// Scans recent send-category transactions to `merchant_wallet` for one
    /// whose total cost (amount + fee) matches `forward` and isn't already
    /// recorded as some other payment's `forwarding_tx_hash` — recovers a
    /// forward broadcast whose txid was lost before it could be persisted.
    /// First match wins.
    async fn recover_forwarding_txid(
        &self,
        merchant_wallet: &str,
        mode: Mode,
        forward: Sats,
    ) -> Result<Option<Txid>, StepError> {
        let known: HashSet<String> =
            self.store.find_outgoing_tx_hashes_by_wallet(merchant_wallet, mode).await?.into_iter().collect();
        let target_btc = crate::amount::sats_to_btc(forward);

        let recent = self.chain(mode).list_transactions(RECOVERY_SCAN_COUNT).await?;
        for tx in recent {
            if tx.category != TransactionCategory::Send {
                continue;
            }
            if tx.address.clone().assume_checked().to_string() != merchant_wallet {
                continue;
            }
            if known.contains(&tx.txid.to_string()) {
                continue;
            }
            let fee = tx.fee.unwrap_or(0.0).abs();
            let total = tx.amount.to_btc().abs() + fee;
            if (total - target_btc).abs() < 1e-8 {
                return Ok(Some(tx.txid));
            }
        }
        Ok(None)
    }

    /// Sweep 3: Forwarded -> Finished.
    async fn sweep_forwarded(&self, mode: Mode) -> Result<(), StepError> {
        let payments = self.store.find_by_current_state(PaymentStateKind::Forwarded, mode).await?;
        for payment in payments {
            if let Err(e) = self.advance_forwarded(&payment, mode).await {
                warn!(payment_id = %payment.id, error = %e, "advance_forwarded failed");
            }
        }
        Ok(())
    }

    async fn advance_forwarded(&self, payment: &Payment, mode: Mode) -> Result<(), StepError> {
        let Some(tx_hash) = payment.forwarding_tx_hash.as_deref() else { return Ok(()) };
        let txid = Txid::from_str(tx_hash).map_err(|e| ChainError::MalformedResponse(e.to_string()))?;
        let tx = self.chain(mode).get_transaction(&txid).await?;
        if tx.confirmations < self.minimum_confirmations as i64 {
            return Ok(());
        }

        let account = self.accounts.get(payment.account_id).await?;

        let finished_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            state: PaymentStateKind::Finished,
            pay_amount: payment.pay_amount,
            amount_received: payment.pay_amount,
            created_at: OffsetDateTime::now_utc(),
        };
        let expected = payment.current_state_id;
        let mut updated = payment.clone();
        updated.current_state_id = finished_state.id;
        updated.forwarding_confirmations = Some(tx.confirmations);

        let persisted = self.store.update(updated, finished_state, expected).await?;
        self.accounts.release(account.id).await?;

        if account.remainder > Sats::ZERO {
            let from_address = parse_address(&account.address)?;
            let unspent = self.chain(mode).list_unspent_for_address(&from_address, 0).await?;
            let total = sum_unspent(&unspent);
            self.accounts.reset_remainder(account.id, total).await?;
        }

        self.notify_best_effort(&persisted, PaymentStateKind::Finished, payment.pay_amount, payment.forwarding_tx_hash.clone())
            .await;
        Ok(())
    }

    /// Sweep 4: Waiting/PartiallyPaid older than 15 minutes -> Paid (missed
    /// notify) or Expired.
    async fn sweep_expired(&self, mode: Mode) -> Result<(), StepError> {
        let older_than = OffsetDateTime::now_utc() - EXPIRY_AFTER;
        let payments = self
            .store
            .find_expired(mode, older_than, &[PaymentStateKind::Waiting, PaymentStateKind::PartiallyPaid])
            .await?;
        for payment in payments {
            if let Err(e) = self.advance_expired(&payment, mode).await {
                warn!(payment_id = %payment.id, error = %e, "advance_expired failed");
            }
        }
        Ok(())
    }

    async fn advance_expired(&self, payment: &Payment, mode: Mode) -> Result<(), StepError> {
        let account = self.accounts.get(payment.account_id).await?;
        let from_address = parse_address(&account.address)?;
        let unspent = self.chain(mode).list_unspent_for_address(&from_address, 0).await?;
        let received = sum_unspent(&unspent).checked_sub(account.remainder);

        let expected = payment.current_state_id;

        if received >= payment.pay_amount {
            let paid_state = PaymentState {
                id: Uuid::new_v4(),
                payment_id: payment.id,
                state: PaymentStateKind::Paid,
                pay_amount: payment.pay_amount,
                amount_received: received,
                created_at: OffsetDateTime::now_utc(),
            };
            let mut updated = payment.clone();
            updated.current_state_id = paid_state.id;
            updated.received_confirmations = Some(0);

            let persisted = self.store.update(updated, paid_state, expected).await?;
            self.notify_best_effort(&persisted, PaymentStateKind::Paid, received, None).await;
            return Ok(());
        }

        let expired_state = PaymentState {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            state: PaymentStateKind::Expired,
            pay_amount: payment.pay_amount,
            amount_received: received,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut updated = payment.clone();
        updated.current_state_id = expired_state.id;

        let persisted = self.store.update(updated, expired_state, expected).await?;
        self.accounts.release(account.id).await?;
        if received > Sats::ZERO {
            self.accounts.reset_remainder(account.id, account.remainder.checked_add(received)).await?;
        }
        self.notify_best_effort(&persisted, PaymentStateKind::Expired, received, None).await;
        Ok(())
    }

    /// Single-attempt webhook delivery: persist first, notify best-effort,
    /// log on failure — a retry is the merchant backend's problem, not ours,
    /// since the next sweep re-derives the same state.
    async fn notify_best_effort(
        &self,
        payment: &Payment,
        state: PaymentStateKind,
        amount_received: Sats,
        tx_hash: Option<String>,
    ) {
        let payload = WebhookPayload {
            payment_id: payment.id,
            pay_amount: payment.pay_amount,
            pay_currency: "BTC",
            actually_paid: amount_received,
            payment_state: state,
            tx_hash,
        };
        if let Err(e) = self.notifier.notify(&payload).await {
            warn!(payment_id = %payment.id, %state, error = %e, "webhook delivery failed");
        }
    }
}

fn sum_unspent(entries: &[crate::chain::types::ListUnspent]) -> Sats {
    entries.iter().fold(Sats::ZERO, |acc, u| acc.checked_add(Sats(u.amount.to_sat())))
}

fn parse_address(s: &str) -> Result<Address<NetworkUnchecked>, StepError> {
    s.parse::<Address<NetworkUnchecked>>()
        .map_err(|e| StepError::Chain(ChainError::MalformedResponse(e.to_string())))
}

trait GetTransactionExt {
    fn category_of(&self, details: &[crate::chain::types::GetTransactionDetail]) -> Option<TransactionCategory>;
}

impl GetTransactionExt for crate::chain::types::GetTransaction {
    fn category_of(&self, details: &[crate::chain::types::GetTransactionDetail]) -> Option<TransactionCategory> {
        details.first().map(|d| d.category)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::chain::test_support::StubChainClient;
    use crate::chain::types::{GetTransaction, GetTransactionDetail, ListUnspent};
    use crate::notifier::test_support::RecordingNotifier;
    use crate::price::test_support::FixedPriceOracle;
    use crate::store::memory::{MemoryAccountStore, MemoryPaymentStore};

    use super::*;

    const MERCHANT_ADDR: &str = "bcrt1qmerchant0000000000000000000000000000";
    const CHANGE_ADDR: &str = "bcrt1qchange00000000000000000000000000000";

    fn test_engine() -> Engine<MemoryAccountStore, StubChainClient, MemoryPaymentStore, RecordingNotifier, FixedPriceOracle>
    {
        let accounts = AccountPool::new(MemoryAccountStore::default());
        let mut chains = HashMap::new();
        chains.insert(Mode::Test, StubChainClient::default());
        let mut change_addresses = HashMap::new();
        change_addresses.insert(Mode::Test, CHANGE_ADDR.to_string());

        Engine::new(
            accounts,
            chains,
            change_addresses,
            MemoryPaymentStore::default(),
            RecordingNotifier::default(),
            FixedPriceOracle(0.00003403), // 1 USD ~ 3403 sats, arbitrary fixed rate
            99,
            0.00002986,
            6,
        )
    }

    fn make_request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            merchant_wallet: MERCHANT_ADDR.to_string(),
            mode: "test".to_string(),
            price_amount: 100.0,
            price_currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn create_payment_allocates_a_fresh_account_and_waits() {
        let engine = test_engine();
        let created = engine.create_payment(make_request()).await.unwrap();
        assert_eq!(created.account.mode, Mode::Test);
        assert!(created.payment.pay_amount > Sats::ZERO);
    }

    #[tokio::test]
    async fn create_payment_rejects_unknown_mode() {
        let engine = test_engine();
        let mut request = make_request();
        request.mode = "lunar".to_string();
        let err = engine.create_payment(request).await.unwrap_err();
        assert!(matches!(err, CreatePaymentError::UnknownMode));
    }

    #[tokio::test]
    async fn happy_path_reaches_finished_and_notifies_every_transition() {
        let engine = test_engine();
        let created = engine.create_payment(make_request()).await.unwrap();
        let address = created.account.address.clone();
        let pay_amount = created.payment.pay_amount;

        engine.store.register_address(created.account.id, &address);

        let deposit_txid: Txid =
            "1111111111111111111111111111111111111111111111111111111111111111".parse().unwrap_or_else(|_| {
                "0000000000000000000000000000000000000000000000000000000000000001".parse().unwrap()
            });

        engine.chains[&Mode::Test].set_unspent(
            &address,
            vec![ListUnspent {
                txid: deposit_txid,
                vout: 0,
                address: address.parse().unwrap(),
                amount: bitcoin::Amount::from_sat(pay_amount.0),
                confirmations: 6,
            }],
        );
        engine.chains[&Mode::Test].set_transaction(
            deposit_txid,
            GetTransaction {
                amount: bitcoin::SignedAmount::from_sat(pay_amount.0 as i64),
                confirmations: 0,
                txid: deposit_txid,
                details: vec![GetTransactionDetail {
                    address: address.parse().unwrap(),
                    category: TransactionCategory::Receive,
                }],
            },
        );

        engine.handle_wallet_notify(Mode::Test, deposit_txid).await;

        let forward_txid: Txid =
            "2222222222222222222222222222222222222222222222222222222222222222".parse().unwrap();
        engine.chains[&Mode::Test].set_next_forward_txid(forward_txid);

        engine.handle_block_notify(Mode::Test).await;
        assert_eq!(engine.chains[&Mode::Test].forward_call_count(), 1);

        engine.chains[&Mode::Test].set_transaction(
            forward_txid,
            GetTransaction {
                amount: bitcoin::SignedAmount::from_sat(-(forward_amount(pay_amount, 99).0 as i64)),
                confirmations: 6,
                txid: forward_txid,
                details: vec![],
            },
        );

        engine.handle_block_notify(Mode::Test).await;

        let (_, history) = engine.store.find_by_address(&address).await.unwrap().into_iter().next().unwrap();
        let states: Vec<_> = history.iter().map(|s| s.state).collect();
        assert!(states.contains(&PaymentStateKind::Forwarded) || states.contains(&PaymentStateKind::Finished));

        let sent = engine.notifier.sent.lock().unwrap();
        assert!(!sent.is_empty());
    }

    #[tokio::test]
    async fn expiry_without_payment_releases_the_account() {
        let engine = test_engine();
        let created = engine.create_payment(make_request()).await.unwrap();
        let address = created.account.address.clone();
        engine.store.register_address(created.account.id, &address);

        // Backdate the payment so the expiry sweep picks it up.
        {
            let mut payments = engine.store.payments_for_test();
            let record = payments.get_mut(&created.payment.id).unwrap();
            record.payment.created_at -= Duration::minutes(16);
        }

        engine.handle_block_notify(Mode::Test).await;

        let (payment, _) = engine.store.find_by_address(&address).await.unwrap().into_iter().next().unwrap();
        assert_eq!(
            engine.store.find_current_by_address(&address).await.unwrap().map(|p| p.id),
            None,
            "expired payment should no longer be current"
        );
        let _ = payment;
    }
}
