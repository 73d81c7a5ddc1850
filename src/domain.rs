//! Core value types shared by every component: the operating mode, the
//! satoshi amount type, and the payment/account state enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which Bitcoin Core node (and passphrase, and change address) a payment is
/// routed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Test,
    Main,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Test => "test",
            Mode::Main => "main",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Mode::Test),
            "main" => Ok(Mode::Main),
            _ => Err(()),
        }
    }
}

/// The closed set of fiat currencies accepted at invoice creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FiatCurrency {
    Usd,
    Eur,
    Chf,
}

impl FiatCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiatCurrency::Usd => "USD",
            FiatCurrency::Eur => "EUR",
            FiatCurrency::Chf => "CHF",
        }
    }
}

impl fmt::Display for FiatCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FiatCurrency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(FiatCurrency::Usd),
            "EUR" => Ok(FiatCurrency::Eur),
            "CHF" => Ok(FiatCurrency::Chf),
            _ => Err(()),
        }
    }
}

/// A single state a payment has been, or is, in. The append-only sequence of
/// these per payment is the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStateKind {
    Waiting,
    PartiallyPaid,
    Paid,
    Confirmed,
    Forwarded,
    Finished,
    Expired,
}

impl PaymentStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStateKind::Waiting => "Waiting",
            PaymentStateKind::PartiallyPaid => "PartiallyPaid",
            PaymentStateKind::Paid => "Paid",
            PaymentStateKind::Confirmed => "Confirmed",
            PaymentStateKind::Forwarded => "Forwarded",
            PaymentStateKind::Finished => "Finished",
            PaymentStateKind::Expired => "Expired",
        }
    }

    /// Terminal states release the deposit account back to the pool.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStateKind::Finished | PaymentStateKind::Expired)
    }
}

impl fmt::Display for PaymentStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStateKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(PaymentStateKind::Waiting),
            "PartiallyPaid" => Ok(PaymentStateKind::PartiallyPaid),
            "Paid" => Ok(PaymentStateKind::Paid),
            "Confirmed" => Ok(PaymentStateKind::Confirmed),
            "Forwarded" => Ok(PaymentStateKind::Forwarded),
            "Finished" => Ok(PaymentStateKind::Finished),
            "Expired" => Ok(PaymentStateKind::Expired),
            _ => Err(()),
        }
    }
}

pub type AccountId = Uuid;
pub type PaymentId = Uuid;
pub type PaymentStateId = Uuid;

/// A deposit address. Materialized from the store as a plain value type;
/// relations (which payment currently owns it) are resolved through store
/// queries, not in-memory pointers.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub address: String,
    pub mode: Mode,
    pub used: bool,
    pub remainder: Sats,
}

/// One invoice.
#[derive(Clone, Debug, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub account_id: AccountId,
    pub merchant_wallet: String,
    pub mode: Mode,
    pub price_amount: f64,
    pub price_currency: FiatCurrency,
    pub created_at: time::OffsetDateTime,
    pub pay_amount: Sats,
    pub current_state_id: PaymentStateId,
    pub forwarding_tx_hash: Option<String>,
    pub forwarding_confirmations: Option<i64>,
    pub received_confirmations: Option<i64>,
}

/// One row of a payment's append-only state history.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentState {
    pub id: PaymentStateId,
    pub payment_id: PaymentId,
    pub state: PaymentStateKind,
    pub pay_amount: Sats,
    pub amount_received: Sats,
    pub created_at: time::OffsetDateTime,
}

/// Satoshi amount. `u64` is the widest native integer we need, since the
/// entire 21e6 BTC supply fits in 64 bits with room to spare.
///
/// The store boundary (de)serializes this as a decimal string rather than a
/// JSON number, so a client parsing the wire payload never has to worry
/// about floating-point precision loss on large satoshi counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sats(pub u64);

impl Sats {
    pub const ZERO: Sats = Sats(0);

    pub fn checked_sub(self, other: Sats) -> Sats {
        Sats(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, other: Sats) -> Sats {
        Sats(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Sats {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Sats)
    }
}

impl Serialize for Sats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Sats {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Sats).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips() {
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
        assert_eq!(Mode::Main.to_string(), "main");
    }

    #[test]
    fn sats_serializes_as_decimal_string() {
        let s = Sats(340_300);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"340300\"");
        let back: Sats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
