//! Diesel row types for the schema in `store::schema`, plus the fallible
//! conversions to/from the domain types in `crate::domain`.

use std::str::FromStr;

use diesel::prelude::*;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{Account, FiatCurrency, Mode, Payment, PaymentState, PaymentStateKind, Sats};
use crate::error::StoreError;

use super::schema::{accounts, payment_states, payments};

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = accounts)]
pub struct AccountRow {
    pub id: Uuid,
    pub mode: String,
    pub address: String,
    pub used: bool,
    pub remainder: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = accounts)]
pub struct NewAccountRow {
    pub id: Uuid,
    pub mode: String,
    pub address: String,
    pub used: bool,
    pub remainder: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = accounts)]
pub struct AccountChangeset {
    pub used: bool,
    pub remainder: String,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            address: row.address,
            mode: Mode::from_str(&row.mode)
                .map_err(|_| StoreError::Database(format!("unknown mode {}", row.mode)))?,
            used: row.used,
            remainder: Sats::from_str(&row.remainder)
                .map_err(|e| StoreError::Database(format!("bad remainder: {e}")))?,
        })
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = payments)]
pub struct PaymentRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub merchant_wallet: String,
    pub mode: String,
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_amount: String,
    pub current_payment_state_id: Option<Uuid>,
    pub forwarding_tx_hash: Option<String>,
    pub forwarding_confirmations: Option<i64>,
    pub received_confirmations: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = payments)]
pub struct NewPaymentRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub merchant_wallet: String,
    pub mode: String,
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_amount: String,
    pub current_payment_state_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = payments)]
pub struct PaymentChangeset {
    pub current_payment_state_id: Option<Uuid>,
    pub forwarding_tx_hash: Option<String>,
    pub forwarding_confirmations: Option<i64>,
    pub received_confirmations: Option<i64>,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let current_state_id = row.current_payment_state_id.ok_or_else(|| {
            StoreError::Database(format!("payment {} has no current state", row.id))
        })?;
        Ok(Payment {
            id: row.id,
            account_id: row.account_id,
            merchant_wallet: row.merchant_wallet,
            mode: Mode::from_str(&row.mode)
                .map_err(|_| StoreError::Database(format!("unknown mode {}", row.mode)))?,
            price_amount: row.price_amount,
            price_currency: FiatCurrency::from_str(&row.price_currency).map_err(|_| {
                StoreError::Database(format!("unknown currency {}", row.price_currency))
            })?,
            created_at: row.created_at,
            pay_amount: Sats::from_str(&row.pay_amount)
                .map_err(|e| StoreError::Database(format!("bad pay_amount: {e}")))?,
            current_state_id,
            forwarding_tx_hash: row.forwarding_tx_hash,
            forwarding_confirmations: row.forwarding_confirmations,
            received_confirmations: row.received_confirmations,
        })
    }
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = payment_states)]
pub struct PaymentStateRow {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub state: String,
    pub pay_amount: String,
    pub amount_received: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = payment_states)]
pub struct NewPaymentStateRow {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub state: String,
    pub pay_amount: String,
    pub amount_received: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<PaymentStateRow> for PaymentState {
    type Error = StoreError;

    fn try_from(row: PaymentStateRow) -> Result<Self, Self::Error> {
        Ok(PaymentState {
            id: row.id,
            payment_id: row.payment_id,
            state: PaymentStateKind::from_str(&row.state)
                .map_err(|_| StoreError::Database(format!("unknown state {}", row.state)))?,
            pay_amount: Sats::from_str(&row.pay_amount)
                .map_err(|e| StoreError::Database(format!("bad pay_amount: {e}")))?,
            amount_received: Sats::from_str(&row.amount_received)
                .map_err(|e| StoreError::Database(format!("bad amount_received: {e}")))?,
            created_at: row.created_at,
        })
    }
}

impl From<&PaymentState> for NewPaymentStateRow {
    fn from(state: &PaymentState) -> Self {
        NewPaymentStateRow {
            id: state.id,
            payment_id: state.payment_id,
            state: state.state.to_string(),
            pay_amount: state.pay_amount.to_string(),
            amount_received: state.amount_received.to_string(),
            created_at: state.created_at,
            updated_at: state.created_at,
        }
    }
}
