//! Hand-written diesel schema for the three tables backing the gateway:
//! `accounts`, `payments`, `payment_states`.
//!
//! `Mode`/`FiatCurrency`/`PaymentStateKind` are stored as plain `Text`
//! columns rather than native Postgres enum types (see DESIGN.md) — a
//! `CREATE TYPE` migration would add ceremony nothing here asks for.

diesel::table! {
    accounts (id) {
        id -> Uuid,
        mode -> Text,
        address -> Text,
        used -> Bool,
        remainder -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        account_id -> Uuid,
        merchant_wallet -> Text,
        mode -> Text,
        price_amount -> Double,
        price_currency -> Text,
        pay_amount -> Text,
        current_payment_state_id -> Nullable<Uuid>,
        forwarding_tx_hash -> Nullable<Text>,
        forwarding_confirmations -> Nullable<BigInt>,
        received_confirmations -> Nullable<BigInt>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payment_states (id) {
        id -> Uuid,
        payment_id -> Uuid,
        state -> Text,
        pay_amount -> Text,
        amount_received -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(payments -> accounts (account_id));
diesel::joinable!(payment_states -> payments (payment_id));
diesel::allow_tables_to_appear_in_same_query!(accounts, payments, payment_states);
