//! `corepc-node`-backed regtest fixtures for chain adapter tests: a
//! wallet-loaded, passphrase-encrypted node, since the gateway's forward
//! flow needs `walletpassphrase`/`signrawtransactionwithwallet`.

use bitcoin::{Address, BlockHash};
use corepc_node::Node;

use crate::chain::client::{Auth, RpcChainClient};

/// The passphrase fixtures encrypt the regtest wallet with.
pub const TEST_WALLET_PASSPHRASE: &str = "correct horse battery staple";

fn get_auth(bitcoind: &Node) -> (String, String) {
    let cookie_values = bitcoind.params.get_cookie_values().unwrap().unwrap();
    (cookie_values.user, cookie_values.password)
}

/// Mines `count` blocks, crediting `address` (or a fresh node address) with
/// the coinbase reward.
pub fn mine_blocks(
    bitcoind: &Node,
    count: usize,
    address: Option<Address>,
) -> anyhow::Result<Vec<BlockHash>> {
    let coinbase_address = match address {
        Some(address) => address,
        None => bitcoind.client.new_address()?,
    };
    let hashes = bitcoind
        .client
        .generate_to_address(count as _, &coinbase_address)?
        .0
        .iter()
        .map(|hash| hash.parse::<BlockHash>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hashes)
}

/// Spins up a regtest `bitcoind`, encrypts its wallet with
/// [`TEST_WALLET_PASSPHRASE`], and returns a connected [`RpcChainClient`]
/// alongside the node handle (which must stay alive for the client to work).
pub async fn get_bitcoind_and_client() -> anyhow::Result<(Node, RpcChainClient)> {
    let bitcoind = Node::from_downloaded()?;
    bitcoind
        .client
        .call::<serde_json::Value>("encryptwallet", &[TEST_WALLET_PASSPHRASE.into()])
        .ok();

    let url = bitcoind.rpc_url();
    let (user, password) = get_auth(&bitcoind);
    let client = RpcChainClient::connect(
        url,
        Auth::UserPass(user, password),
        TEST_WALLET_PASSPHRASE.to_string(),
        None,
        None,
    )
    .await?;
    Ok((bitcoind, client))
}
