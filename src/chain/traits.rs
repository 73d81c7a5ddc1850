//! The chain adapter seam.
//!
//! A single trait covering reads, broadcast, wallet, and signing — the
//! gateway only ever needs one adapter per `Mode`, so there is no reason to
//! keep the RPC surface split across several traits the way a
//! general-purpose client might.

use std::future::Future;

use bitcoin::{Address, NetworkUnchecked, Txid};

use crate::chain::types::{
    EstimateSmartFee, GetTransaction, ListTransactions, ListUnspent, NetworkParams,
};
use crate::domain::Sats;
use crate::error::ChainError;

pub type ChainResult<T> = Result<T, ChainError>;

/// Everything the lifecycle engine needs from a Bitcoin Core wallet node.
pub trait ChainClient: Send + Sync {
    /// Network this client was constructed against (resolved once at
    /// startup via `getblockchaininfo`).
    fn network_params(&self) -> NetworkParams;

    /// Allocates a fresh receive address from the node's wallet.
    fn new_address(&self) -> impl Future<Output = ChainResult<Address<NetworkUnchecked>>> + Send;

    /// `gettransaction` — used on wallet-notify to read the confirmation
    /// count and category of the notified txid.
    fn get_transaction(
        &self,
        txid: &Txid,
    ) -> impl Future<Output = ChainResult<GetTransaction>> + Send;

    /// `listunspent` filtered to a single address, with a minimum
    /// confirmation count. Used both at wallet-notify (`minconf = 0`) and at
    /// the confirmation sweeps (`minconf = 6`).
    fn list_unspent_for_address(
        &self,
        address: &Address<NetworkUnchecked>,
        min_conf: u32,
    ) -> impl Future<Output = ChainResult<Vec<ListUnspent>>> + Send;

    /// `listtransactions`, newest first, used by orphan-broadcast recovery
    /// to find a forward that went out but was never recorded.
    fn list_transactions(
        &self,
        count: u32,
    ) -> impl Future<Output = ChainResult<Vec<ListTransactions>>> + Send;

    /// `estimatesmartfee` at the given confirmation target, in BTC/kB. Does
    /// not apply the constant fallback — that's the caller's job when Core
    /// reports insufficient data.
    fn estimate_smart_fee(
        &self,
        conf_target: u16,
    ) -> impl Future<Output = ChainResult<EstimateSmartFee>> + Send;

    /// Builds, funds, signs and broadcasts a transaction paying `amount` to
    /// `destination`, spending the UTXOs currently sitting on `from_address`
    /// with at least `min_conf` confirmations, change returned to
    /// `change_address`. The wallet passphrase used to unlock for signing
    /// is the one this client was constructed with. Returns the broadcast
    /// txid.
    fn build_and_send_forward(
        &self,
        from_address: &Address<NetworkUnchecked>,
        destination: &Address<NetworkUnchecked>,
        amount: Sats,
        change_address: &Address<NetworkUnchecked>,
        min_conf: u32,
    ) -> impl Future<Output = ChainResult<Txid>> + Send;
}
