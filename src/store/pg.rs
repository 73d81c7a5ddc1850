//! Postgres-backed implementation of [`AccountStore`]/[`PaymentStore`],
//! over a diesel `r2d2::Pool<ConnectionManager<PgConnection>>`. Diesel's
//! blocking API is bridged into the async engine via
//! `tokio::task::spawn_blocking`.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{Account, AccountId, Mode, Payment, PaymentState, PaymentStateId, PaymentStateKind, Sats};
use crate::error::StoreError;

use super::models::{
    AccountChangeset, AccountRow, NewAccountRow, NewPaymentRow, NewPaymentStateRow, PaymentChangeset,
    PaymentRow, PaymentStateRow,
};
use super::schema::{accounts, payment_states, payments};
use super::{AccountStore, PaymentStore, StoreResult};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Runs every pending migration in `migrations/`, getting the schema this
/// store queries against into existence before the binary starts serving.
pub fn run_migration(conn: &mut PgConnection) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Builds the pool the binary wires into [`PgStore`].
pub fn build_pool(database_url: &str) -> Result<PgPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("blocking task panicked: {e}")))?
    }
}

const NON_TERMINAL_STATES: [&str; 2] = ["Waiting", "PartiallyPaid"];

impl AccountStore for PgStore {
    async fn try_allocate(&self, mode: Mode) -> StoreResult<Option<Account>> {
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let candidate = accounts::table
                    .filter(accounts::mode.eq(mode.as_str()))
                    .filter(accounts::used.eq(false))
                    .filter(accounts::deleted_at.is_null())
                    .for_update()
                    .first::<AccountRow>(conn)
                    .optional()
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                let Some(candidate) = candidate else {
                    return Ok(None);
                };

                let now = OffsetDateTime::now_utc();
                diesel::update(accounts::table.find(candidate.id))
                    .set(AccountChangeset {
                        used: true,
                        remainder: candidate.remainder.clone(),
                        updated_at: now,
                    })
                    .execute(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                let updated = accounts::table
                    .find(candidate.id)
                    .first::<AccountRow>(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(Some(Account::try_from(updated)?))
            })
        })
        .await
    }

    async fn create(&self, mode: Mode, address: String) -> StoreResult<Account> {
        self.with_conn(move |conn| {
            let now = OffsetDateTime::now_utc();
            let row = NewAccountRow {
                id: Uuid::new_v4(),
                mode: mode.to_string(),
                address,
                used: true,
                remainder: "0".to_string(),
                created_at: now,
                updated_at: now,
            };
            let inserted = diesel::insert_into(accounts::table)
                .values(&row)
                .get_result::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Account::try_from(inserted)
        })
        .await
    }

    async fn release(&self, account_id: AccountId) -> StoreResult<Account> {
        self.with_conn(move |conn| {
            let current = accounts::table
                .find(account_id)
                .first::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let now = OffsetDateTime::now_utc();
            let updated = diesel::update(accounts::table.find(account_id))
                .set(AccountChangeset { used: false, remainder: current.remainder, updated_at: now })
                .get_result::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Account::try_from(updated)
        })
        .await
    }

    async fn set_remainder(&self, account_id: AccountId, remainder: Sats) -> StoreResult<Account> {
        self.with_conn(move |conn| {
            let current = accounts::table
                .find(account_id)
                .first::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let now = OffsetDateTime::now_utc();
            let updated = diesel::update(accounts::table.find(account_id))
                .set(AccountChangeset {
                    used: current.used,
                    remainder: remainder.to_string(),
                    updated_at: now,
                })
                .get_result::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Account::try_from(updated)
        })
        .await
    }

    async fn get(&self, account_id: AccountId) -> StoreResult<Account> {
        self.with_conn(move |conn| {
            let row = accounts::table
                .find(account_id)
                .first::<AccountRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Account::try_from(row)
        })
        .await
    }
}

fn payment_rows_with_state(
    conn: &mut PgConnection,
    filter_states: &[&str],
    mode: Option<Mode>,
    account_id: Option<Uuid>,
) -> Result<Vec<PaymentRow>, diesel::result::Error> {
    let mut query = payments::table
        .inner_join(payment_states::table.on(payments::current_payment_state_id.eq(payment_states::id.nullable())))
        .filter(payment_states::state.eq_any(filter_states.to_vec()))
        .filter(payments::deleted_at.is_null())
        .select(payments::all_columns)
        .into_boxed();

    if let Some(mode) = mode {
        query = query.filter(payments::mode.eq(mode.to_string()));
    }
    if let Some(account_id) = account_id {
        query = query.filter(payments::account_id.eq(account_id));
    }

    query.load::<PaymentRow>(conn)
}

impl PaymentStore for PgStore {
    async fn create(&self, payment: Payment, initial_state: PaymentState) -> StoreResult<Payment> {
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let now = OffsetDateTime::now_utc();
                let payment_row = NewPaymentRow {
                    id: payment.id,
                    account_id: payment.account_id,
                    merchant_wallet: payment.merchant_wallet.clone(),
                    mode: payment.mode.to_string(),
                    price_amount: payment.price_amount,
                    price_currency: payment.price_currency.to_string(),
                    pay_amount: payment.pay_amount.to_string(),
                    current_payment_state_id: None,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(payments::table)
                    .values(&payment_row)
                    .execute(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                let state_row = NewPaymentStateRow::from(&initial_state);
                diesel::insert_into(payment_states::table)
                    .values(&state_row)
                    .execute(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                diesel::update(payments::table.find(payment.id))
                    .set(payments::current_payment_state_id.eq(initial_state.id))
                    .execute(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                let row = payments::table
                    .find(payment.id)
                    .first::<PaymentRow>(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Payment::try_from(row)
            })
        })
        .await
    }

    async fn find_current_by_address(&self, address: &str) -> StoreResult<Option<Payment>> {
        let address = address.to_string();
        self.with_conn(move |conn| {
            let account_id: Option<Uuid> = accounts::table
                .filter(accounts::address.eq(&address))
                .select(accounts::id)
                .first(conn)
                .optional()
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let Some(account_id) = account_id else { return Ok(None) };

            let row = payment_rows_with_state(conn, &NON_TERMINAL_STATES, None, Some(account_id))
                .map_err(|e| StoreError::Database(e.to_string()))?
                .into_iter()
                .next();
            row.map(Payment::try_from).transpose()
        })
        .await
    }

    async fn find_by_address(&self, address: &str) -> StoreResult<Vec<(Payment, Vec<PaymentState>)>> {
        let address = address.to_string();
        self.with_conn(move |conn| {
            let account_id: Option<Uuid> = accounts::table
                .filter(accounts::address.eq(&address))
                .select(accounts::id)
                .first(conn)
                .optional()
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let Some(account_id) = account_id else { return Ok(Vec::new()) };

            let rows = payments::table
                .filter(payments::account_id.eq(account_id))
                .filter(payments::deleted_at.is_null())
                .load::<PaymentRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let states = payment_states::table
                    .filter(payment_states::payment_id.eq(row.id))
                    .order(payment_states::created_at.asc())
                    .load::<PaymentStateRow>(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?
                    .into_iter()
                    .map(PaymentState::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                out.push((Payment::try_from(row)?, states));
            }
            Ok(out)
        })
        .await
    }

    async fn find_by_current_state(&self, state: PaymentStateKind, mode: Mode) -> StoreResult<Vec<Payment>> {
        self.with_conn(move |conn| {
            payment_rows_with_state(conn, &[state.as_str()], Some(mode), None)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .into_iter()
                .map(Payment::try_from)
                .collect()
        })
        .await
    }

    async fn find_expired(
        &self,
        mode: Mode,
        older_than: OffsetDateTime,
        states: &[PaymentStateKind],
    ) -> StoreResult<Vec<Payment>> {
        let state_strs: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        self.with_conn(move |conn| {
            payments::table
                .inner_join(
                    payment_states::table.on(payments::current_payment_state_id.eq(payment_states::id.nullable())),
                )
                .filter(payments::mode.eq(mode.to_string()))
                .filter(payments::created_at.lt(older_than))
                .filter(payment_states::state.eq_any(state_strs))
                .filter(payments::deleted_at.is_null())
                .select(payments::all_columns)
                .load::<PaymentRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .into_iter()
                .map(Payment::try_from)
                .collect()
        })
        .await
    }

    async fn find_outgoing_tx_hashes_by_wallet(&self, wallet: &str, mode: Mode) -> StoreResult<Vec<String>> {
        let wallet = wallet.to_string();
        self.with_conn(move |conn| {
            payments::table
                .filter(payments::merchant_wallet.eq(&wallet))
                .filter(payments::mode.eq(mode.to_string()))
                .filter(payments::forwarding_tx_hash.is_not_null())
                .select(payments::forwarding_tx_hash)
                .load::<Option<String>>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))
                .map(|v| v.into_iter().flatten().collect())
        })
        .await
    }

    async fn update(
        &self,
        payment: Payment,
        new_state: PaymentState,
        expected_current_state_id: PaymentStateId,
    ) -> StoreResult<Payment> {
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let state_row = NewPaymentStateRow::from(&new_state);
                diesel::insert_into(payment_states::table)
                    .values(&state_row)
                    .execute(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;

                let now = OffsetDateTime::now_utc();
                let affected = diesel::update(
                    payments::table
                        .find(payment.id)
                        .filter(payments::current_payment_state_id.eq(expected_current_state_id)),
                )
                .set(PaymentChangeset {
                    current_payment_state_id: Some(new_state.id),
                    forwarding_tx_hash: payment.forwarding_tx_hash.clone(),
                    forwarding_confirmations: payment.forwarding_confirmations,
                    received_confirmations: payment.received_confirmations,
                    updated_at: now,
                })
                .execute(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;

                if affected == 0 {
                    return Err(StoreError::Conflict {
                        expected: expected_current_state_id,
                        found: payment.current_state_id,
                    });
                }

                let row = payments::table
                    .find(payment.id)
                    .first::<PaymentRow>(conn)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Payment::try_from(row)
            })
        })
        .await
    }

    async fn update_fields(&self, payment: Payment, expected_current_state_id: PaymentStateId) -> StoreResult<Payment> {
        self.with_conn(move |conn| {
            let now = OffsetDateTime::now_utc();
            let affected = diesel::update(
                payments::table
                    .find(payment.id)
                    .filter(payments::current_payment_state_id.eq(expected_current_state_id)),
            )
            .set(PaymentChangeset {
                current_payment_state_id: Some(expected_current_state_id),
                forwarding_tx_hash: payment.forwarding_tx_hash.clone(),
                forwarding_confirmations: payment.forwarding_confirmations,
                received_confirmations: payment.received_confirmations,
                updated_at: now,
            })
            .execute(conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

            if affected == 0 {
                return Err(StoreError::Conflict {
                    expected: expected_current_state_id,
                    found: payment.current_state_id,
                });
            }

            let row = payments::table
                .find(payment.id)
                .first::<PaymentRow>(conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Payment::try_from(row)
        })
        .await
    }
}
