//! Wire types for the subset of the Bitcoin Core JSON-RPC surface the
//! gateway actually calls.
//!
//! One struct per RPC result, with small `Deserialize`-only visitor helpers
//! for the fields Core returns as loosely-typed JSON (BTC floats, hex
//! strings, addresses).

use bitcoin::{
    address::NetworkUnchecked, consensus, Address, Amount, SignedAmount, Transaction, Txid,
};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

fn deserialize_bitcoin<'d, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'d>,
{
    struct BtcVisitor;
    impl Visitor<'_> for BtcVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a float representation of a btc amount")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Amount::from_btc(v).map_err(|e| de::Error::custom(e.to_string()))
        }
    }
    deserializer.deserialize_f64(BtcVisitor)
}

fn deserialize_signed_bitcoin<'d, D>(deserializer: D) -> Result<SignedAmount, D::Error>
where
    D: Deserializer<'d>,
{
    struct SignedBtcVisitor;
    impl Visitor<'_> for SignedBtcVisitor {
        type Value = SignedAmount;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a float representation of a signed btc amount")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            SignedAmount::from_btc(v).map_err(|e| de::Error::custom(e.to_string()))
        }
    }
    deserializer.deserialize_f64(SignedBtcVisitor)
}

fn deserialize_address<'d, D>(deserializer: D) -> Result<Address<NetworkUnchecked>, D::Error>
where
    D: Deserializer<'d>,
{
    struct AddressVisitor;
    impl Visitor<'_> for AddressVisitor {
        type Value = Address<NetworkUnchecked>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a bitcoin address string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.parse::<Address<NetworkUnchecked>>()
                .map_err(|e| de::Error::custom(e.to_string()))
        }
    }
    deserializer.deserialize_str(AddressVisitor)
}

fn deserialize_txid<'d, D>(deserializer: D) -> Result<Txid, D::Error>
where
    D: Deserializer<'d>,
{
    struct TxidVisitor;
    impl Visitor<'_> for TxidVisitor {
        type Value = Txid;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a transaction id string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.parse::<Txid>().map_err(|e| de::Error::custom(e.to_string()))
        }
    }
    deserializer.deserialize_str(TxidVisitor)
}

/// Result of `gettransaction`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GetTransaction {
    #[serde(deserialize_with = "deserialize_signed_bitcoin")]
    pub amount: SignedAmount,
    pub confirmations: i64,
    #[serde(deserialize_with = "deserialize_txid")]
    pub txid: Txid,
    pub details: Vec<GetTransactionDetail>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GetTransactionDetail {
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address<NetworkUnchecked>,
    pub category: TransactionCategory,
}

/// The category of a transaction or UTXO, as reported by `listtransactions`
/// and `listunspent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Send,
    Receive,
    Generate,
    Immature,
    Orphan,
}

/// Result of `listunspent`, one per UTXO.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ListUnspent {
    #[serde(deserialize_with = "deserialize_txid")]
    pub txid: Txid,
    pub vout: u32,
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address<NetworkUnchecked>,
    #[serde(deserialize_with = "deserialize_bitcoin")]
    pub amount: Amount,
    pub confirmations: u32,
}

/// Result of `listtransactions`, one per wallet transaction.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ListTransactions {
    #[serde(deserialize_with = "deserialize_address")]
    pub address: Address<NetworkUnchecked>,
    pub category: TransactionCategory,
    #[serde(deserialize_with = "deserialize_signed_bitcoin")]
    pub amount: SignedAmount,
    /// Negative of the network fee paid, in BTC, present on `send` entries.
    pub fee: Option<f64>,
    #[serde(deserialize_with = "deserialize_txid")]
    pub txid: Txid,
}

/// Result of `getblockchaininfo`, trimmed to what the gateway needs to
/// derive `NetworkParams`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GetBlockchainInfo {
    pub chain: String,
}

/// The network a chain adapter is talking to, derived once from
/// `getblockchaininfo` rather than selected by config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: bitcoin::Network,
}

impl NetworkParams {
    pub fn from_chain_name(chain: &str) -> Option<Self> {
        let network = match chain {
            "main" => bitcoin::Network::Bitcoin,
            "test" => bitcoin::Network::Testnet,
            "regtest" => bitcoin::Network::Regtest,
            "signet" => bitcoin::Network::Signet,
            _ => return None,
        };
        Some(NetworkParams { network })
    }
}

/// `getnewaddress` wraps its result in a bare string.
#[derive(Clone, Debug, Deserialize)]
pub struct GetNewAddress(pub String);

/// Input side of `createrawtransaction`.
#[derive(Clone, Debug, Serialize)]
pub struct CreateRawTransactionInput {
    pub txid: String,
    pub vout: u32,
}

/// Options accepted by `fundrawtransaction`.
#[derive(Clone, Debug, Serialize)]
pub struct FundRawTransactionOptions {
    #[serde(rename = "changeAddress")]
    pub change_address: String,
    #[serde(rename = "changePosition")]
    pub change_position: u32,
    #[serde(rename = "subtractFeeFromOutputs")]
    pub subtract_fee_from_outputs: Vec<u32>,
    pub replaceable: bool,
    #[serde(rename = "fee_rate")]
    pub fee_rate: f64,
}

/// Result of `fundrawtransaction`.
#[derive(Clone, Debug, Deserialize)]
pub struct FundRawTransactionResult {
    pub hex: String,
    pub fee: f64,
    pub changepos: i32,
}

impl FundRawTransactionResult {
    pub fn transaction(&self) -> Result<Transaction, consensus::encode::FromHexError> {
        consensus::encode::deserialize_hex(&self.hex)
    }
}

/// Result of `signrawtransactionwithwallet`.
#[derive(Clone, Debug, Deserialize)]
pub struct SignRawTransactionWithWallet {
    pub hex: String,
    pub complete: bool,
}

impl SignRawTransactionWithWallet {
    pub fn transaction(&self) -> Result<Transaction, consensus::encode::FromHexError> {
        consensus::encode::deserialize_hex(&self.hex)
    }
}

/// Result of `estimatesmartfee`. `feerate` is absent when Core reports
/// insufficient data, in which case the caller falls back to the
/// configured constant.
#[derive(Clone, Debug, Deserialize)]
pub struct EstimateSmartFee {
    pub feerate: Option<f64>,
    pub errors: Option<Vec<String>>,
}
