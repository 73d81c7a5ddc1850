//! In-process test doubles for [`AccountStore`]/[`PaymentStore`] — the
//! same "trait + lightweight test double" shape the corpus uses for
//! integration points it doesn't want to spin up Postgres for. Backs the
//! engine's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;

use crate::domain::{Account, AccountId, Mode, Payment, PaymentState, PaymentStateId, PaymentStateKind, Sats};
use crate::error::StoreError;

use super::{AccountStore, PaymentStore, StoreResult};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl AccountStore for MemoryAccountStore {
    async fn try_allocate(&self, mode: Mode) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.lock().unwrap();
        let candidate = accounts.values_mut().find(|a| a.mode == mode && !a.used);
        Ok(candidate.map(|a| {
            a.used = true;
            a.clone()
        }))
    }

    async fn create(&self, mode: Mode, address: String) -> StoreResult<Account> {
        let account = Account { id: uuid::Uuid::new_v4(), address, mode, used: true, remainder: Sats::ZERO };
        self.accounts.lock().unwrap().insert(account.id, account.clone());
        Ok(account)
    }

    async fn release(&self, account_id: AccountId) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        account.used = false;
        Ok(account.clone())
    }

    async fn set_remainder(&self, account_id: AccountId, remainder: Sats) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        account.remainder = remainder;
        Ok(account.clone())
    }

    async fn get(&self, account_id: AccountId) -> StoreResult<Account> {
        self.accounts.lock().unwrap().get(&account_id).cloned().ok_or(StoreError::NotFound)
    }
}

pub struct PaymentRecord {
    pub payment: Payment,
    pub states: Vec<PaymentState>,
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    payments: Mutex<HashMap<uuid::Uuid, PaymentRecord>>,
    addresses: Mutex<HashMap<uuid::Uuid, String>>,
}

impl MemoryPaymentStore {
    /// Test helper: associates an account id with its address so
    /// `find_current_by_address`/`find_by_address` can resolve it, mirroring
    /// the join the Postgres implementation performs against `accounts`.
    pub fn register_address(&self, account_id: AccountId, address: impl Into<String>) {
        self.addresses.lock().unwrap().insert(account_id, address.into());
    }

    /// Test-only escape hatch for directly mutating a payment record (e.g.
    /// backdating `created_at` to exercise the expiry sweep) without a
    /// CAS-guarded `update` call.
    #[cfg(any(test, feature = "test-util"))]
    pub fn payments_for_test(&self) -> std::sync::MutexGuard<'_, HashMap<uuid::Uuid, PaymentRecord>> {
        self.payments.lock().unwrap()
    }
}

impl PaymentStore for MemoryPaymentStore {
    async fn create(&self, payment: Payment, initial_state: PaymentState) -> StoreResult<Payment> {
        let mut payments = self.payments.lock().unwrap();
        payments.insert(payment.id, PaymentRecord { payment: payment.clone(), states: vec![initial_state] });
        Ok(payment)
    }

    async fn find_current_by_address(&self, address: &str) -> StoreResult<Option<Payment>> {
        let addresses = self.addresses.lock().unwrap();
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .find(|r| {
                addresses.get(&r.payment.account_id).map(String::as_str) == Some(address)
                    && matches!(r.payment_state_kind(), PaymentStateKind::Waiting | PaymentStateKind::PartiallyPaid)
            })
            .map(|r| r.payment.clone()))
    }

    async fn find_by_address(&self, address: &str) -> StoreResult<Vec<(Payment, Vec<PaymentState>)>> {
        let addresses = self.addresses.lock().unwrap();
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|r| addresses.get(&r.payment.account_id).map(String::as_str) == Some(address))
            .map(|r| (r.payment.clone(), r.states.clone()))
            .collect())
    }

    async fn find_by_current_state(&self, state: PaymentStateKind, mode: Mode) -> StoreResult<Vec<Payment>> {
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|r| r.payment.mode == mode && r.payment_state_kind() == state)
            .map(|r| r.payment.clone())
            .collect())
    }

    async fn find_expired(
        &self,
        mode: Mode,
        older_than: OffsetDateTime,
        states: &[PaymentStateKind],
    ) -> StoreResult<Vec<Payment>> {
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|r| {
                r.payment.mode == mode
                    && r.payment.created_at < older_than
                    && states.contains(&r.payment_state_kind())
            })
            .map(|r| r.payment.clone())
            .collect())
    }

    async fn find_outgoing_tx_hashes_by_wallet(&self, wallet: &str, mode: Mode) -> StoreResult<Vec<String>> {
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|r| r.payment.merchant_wallet == wallet && r.payment.mode == mode)
            .filter_map(|r| r.payment.forwarding_tx_hash.clone())
            .collect())
    }

    async fn update(
        &self,
        payment: Payment,
        new_state: PaymentState,
        expected_current_state_id: PaymentStateId,
    ) -> StoreResult<Payment> {
        let mut payments = self.payments.lock().unwrap();
        let record = payments.get_mut(&payment.id).ok_or(StoreError::NotFound)?;
        if record.payment.current_state_id != expected_current_state_id {
            return Err(StoreError::Conflict {
                expected: expected_current_state_id,
                found: record.payment.current_state_id,
            });
        }
        record.states.push(new_state);
        record.payment = payment.clone();
        Ok(payment)
    }

    async fn update_fields(&self, payment: Payment, expected_current_state_id: PaymentStateId) -> StoreResult<Payment> {
        let mut payments = self.payments.lock().unwrap();
        let record = payments.get_mut(&payment.id).ok_or(StoreError::NotFound)?;
        if record.payment.current_state_id != expected_current_state_id {
            return Err(StoreError::Conflict {
                expected: expected_current_state_id,
                found: record.payment.current_state_id,
            });
        }
        record.payment = payment.clone();
        Ok(payment)
    }
}

impl PaymentRecord {
    fn payment_state_kind(&self) -> PaymentStateKind {
        self.states
            .iter()
            .find(|s| s.id == self.payment.current_state_id)
            .map(|s| s.state)
            .unwrap_or(PaymentStateKind::Waiting)
    }
}
