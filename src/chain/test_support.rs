//! A scriptable, in-process [`ChainClient`] double for engine/account-pool
//! unit tests — no regtest node required. Complements
//! `chain::test_utils`'s `corepc-node` fixtures, which exercise the real
//! RPC wire format instead.

use std::collections::HashMap;
use std::sync::Mutex;

use bitcoin::{Address, NetworkUnchecked, Txid};

use crate::chain::traits::{ChainClient, ChainResult};
use crate::chain::types::{EstimateSmartFee, GetTransaction, ListTransactions, ListUnspent, NetworkParams};
use crate::domain::Sats;
use crate::error::ChainError;

fn addr_key(address: &Address<NetworkUnchecked>) -> String {
    address.clone().assume_checked().to_string()
}

/// Scripted responses for one [`StubChainClient`]. Each field a test wants
/// to control is set directly; everything else returns an empty/zero
/// default, mirroring a freshly-synced node with no history.
pub struct StubChainClient {
    pub network: NetworkParams,
    pub transactions: Mutex<HashMap<Txid, GetTransaction>>,
    pub unspent_by_address: Mutex<HashMap<String, Vec<ListUnspent>>>,
    pub wallet_transactions: Mutex<Vec<ListTransactions>>,
    pub fee_rate: Mutex<Option<f64>>,
    pub next_new_address: Mutex<Vec<String>>,
    pub next_forward_txid: Mutex<Option<Txid>>,
    pub forward_calls: Mutex<u32>,
}

impl Default for StubChainClient {
    fn default() -> Self {
        Self {
            network: NetworkParams { network: bitcoin::Network::Regtest },
            transactions: Mutex::new(HashMap::new()),
            unspent_by_address: Mutex::new(HashMap::new()),
            wallet_transactions: Mutex::new(Vec::new()),
            fee_rate: Mutex::new(None),
            next_new_address: Mutex::new(Vec::new()),
            next_forward_txid: Mutex::new(None),
            forward_calls: Mutex::new(0),
        }
    }
}

impl StubChainClient {
    pub fn set_unspent(&self, address: &str, entries: Vec<ListUnspent>) {
        self.unspent_by_address.lock().unwrap().insert(address.to_string(), entries);
    }

    pub fn set_transaction(&self, txid: Txid, tx: GetTransaction) {
        self.transactions.lock().unwrap().insert(txid, tx);
    }

    pub fn push_new_address(&self, address: impl Into<String>) {
        self.next_new_address.lock().unwrap().push(address.into());
    }

    pub fn set_next_forward_txid(&self, txid: Txid) {
        *self.next_forward_txid.lock().unwrap() = Some(txid);
    }

    pub fn forward_call_count(&self) -> u32 {
        *self.forward_calls.lock().unwrap()
    }
}

impl ChainClient for StubChainClient {
    fn network_params(&self) -> NetworkParams {
        self.network
    }

    async fn new_address(&self) -> ChainResult<Address<NetworkUnchecked>> {
        let mut queue = self.next_new_address.lock().unwrap();
        let address = if queue.is_empty() {
            format!("bcrt1q-stub-{}", uuid::Uuid::new_v4().simple())
        } else {
            queue.remove(0)
        };
        address
            .parse()
            .map_err(|e: bitcoin::address::ParseError| ChainError::MalformedResponse(e.to_string()))
    }

    async fn get_transaction(&self, txid: &Txid) -> ChainResult<GetTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| ChainError::Other(format!("stub has no transaction for {txid}")))
    }

    async fn list_unspent_for_address(
        &self,
        address: &Address<NetworkUnchecked>,
        min_conf: u32,
    ) -> ChainResult<Vec<ListUnspent>> {
        let key = addr_key(address);
        Ok(self
            .unspent_by_address
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|u| u.confirmations >= min_conf)
            .collect())
    }

    async fn list_transactions(&self, count: u32) -> ChainResult<Vec<ListTransactions>> {
        let txs = self.wallet_transactions.lock().unwrap();
        Ok(txs.iter().rev().take(count as usize).cloned().collect())
    }

    async fn estimate_smart_fee(&self, _conf_target: u16) -> ChainResult<EstimateSmartFee> {
        Ok(EstimateSmartFee { feerate: *self.fee_rate.lock().unwrap(), errors: None })
    }

    async fn build_and_send_forward(
        &self,
        _from_address: &Address<NetworkUnchecked>,
        _destination: &Address<NetworkUnchecked>,
        _amount: Sats,
        _change_address: &Address<NetworkUnchecked>,
        _min_conf: u32,
    ) -> ChainResult<Txid> {
        *self.forward_calls.lock().unwrap() += 1;
        self.next_forward_txid
            .lock()
            .unwrap()
            .ok_or_else(|| ChainError::Other("stub has no scripted forwarding txid".to_string()))
    }
}
