//! Durable persistence of accounts, payments and their state history.
//!
//! `AccountStore`/`PaymentStore` are the seam: a trait per collaborator,
//! concrete types only at the binary's wiring point. The production
//! implementation (`pg::PgStore`) is a diesel
//! `r2d2::Pool<ConnectionManager<PgConnection>>` over the schema in
//! `store::schema`. `memory::MemoryStore` is the in-process test double the
//! engine's unit tests run against.

pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;

use std::future::Future;

use time::OffsetDateTime;

use crate::domain::{Account, AccountId, Mode, Payment, PaymentState, PaymentStateId, PaymentStateKind, Sats};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// The address pool's handle onto the `accounts` table.
pub trait AccountStore: Send + Sync {
    /// Atomically claims one unused account for `mode`, if any exists
    /// (`SELECT FOR UPDATE` on the candidate row).
    fn try_allocate(&self, mode: Mode) -> impl Future<Output = StoreResult<Option<Account>>> + Send;

    /// Creates a brand new, already-`used` account, once the pool has run
    /// out of free ones for `mode`.
    fn create(&self, mode: Mode, address: String) -> impl Future<Output = StoreResult<Account>> + Send;

    /// Releases an account back to the pool (terminal-state transition).
    fn release(&self, account_id: AccountId) -> impl Future<Output = StoreResult<Account>> + Send;

    /// Overwrites the `remainder`, used by the expiry/finish sweeps'
    /// remainder bookkeeping.
    fn set_remainder(&self, account_id: AccountId, remainder: Sats) -> impl Future<Output = StoreResult<Account>> + Send;

    fn get(&self, account_id: AccountId) -> impl Future<Output = StoreResult<Account>> + Send;
}

/// The payment store's handle onto `payments`/`payment_states`.
pub trait PaymentStore: Send + Sync {
    /// Writes the payment row and its initial state row atomically
    /// (`payment.current_state_id` must equal `initial_state.id`).
    fn create(
        &self,
        payment: Payment,
        initial_state: PaymentState,
    ) -> impl Future<Output = StoreResult<Payment>> + Send;

    /// The non-terminal payment at `address`, if any (state in
    /// {Waiting, PartiallyPaid}).
    fn find_current_by_address(
        &self,
        address: &str,
    ) -> impl Future<Output = StoreResult<Option<Payment>>> + Send;

    /// `findByAddress`, preloading the full state history, for
    /// reconciliation and tests.
    fn find_by_address(
        &self,
        address: &str,
    ) -> impl Future<Output = StoreResult<Vec<(Payment, Vec<PaymentState>)>>> + Send;

    /// `findByCurrentState` — backs the four block-notify sweeps.
    fn find_by_current_state(
        &self,
        state: PaymentStateKind,
        mode: Mode,
    ) -> impl Future<Output = StoreResult<Vec<Payment>>> + Send;

    /// `findExpired` — non-terminal payments older than `older_than` whose
    /// current state is one of `states`.
    fn find_expired(
        &self,
        mode: Mode,
        older_than: OffsetDateTime,
        states: &[PaymentStateKind],
    ) -> impl Future<Output = StoreResult<Vec<Payment>>> + Send;

    /// `findOutgoingTxHashesByWallet` — every `forwarding_tx_hash` this
    /// store already knows about for `wallet`, used by orphan-broadcast
    /// recovery to exclude already-adopted sends.
    fn find_outgoing_tx_hashes_by_wallet(
        &self,
        wallet: &str,
        mode: Mode,
    ) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Appends `new_state` to the history and advances `payment`'s current
    /// pointer and forwarding fields, all in one transaction, conditioned on
    /// the in-DB `current_payment_state_id` still matching
    /// `expected_current_state_id`. Returns [`StoreError::Conflict`] on a
    /// stale write.
    fn update(
        &self,
        payment: Payment,
        new_state: PaymentState,
        expected_current_state_id: PaymentStateId,
    ) -> impl Future<Output = StoreResult<Payment>> + Send;

    /// Persists `payment`'s forwarding/received-confirmation fields without
    /// appending a new state row — the "persist again" half of sweep 1 and
    /// the rebuild-and-broadcast branch of sweep 2, where the payment stays
    /// in the same state but gains a `forwardingTxHash`. Still CAS-guarded
    /// on `expected_current_state_id`.
    fn update_fields(
        &self,
        payment: Payment,
        expected_current_state_id: PaymentStateId,
    ) -> impl Future<Output = StoreResult<Payment>> + Send;
}
