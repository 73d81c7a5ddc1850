//! Allocates a free deposit address per mode, lazily creating new
//! addresses via the chain adapter when the pool runs dry.

use tracing::info;

use crate::chain::ChainClient;
use crate::domain::{Account, AccountId, Mode, Sats};
use crate::error::AccountError;
use crate::store::AccountStore;

/// Wraps an [`AccountStore`] handle with allocate/release/reset-remainder
/// operations. The chain client is a per-call parameter rather than a
/// field — the gateway runs one Core node per [`Mode`], so the pool itself
/// stays mode-agnostic and the engine hands it whichever of its per-mode
/// clients matches the account being allocated.
pub struct AccountPool<S: AccountStore> {
    store: S,
}

impl<S: AccountStore> AccountPool<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// If an unused account for `mode` exists, claims it; otherwise asks
    /// `chain` for a fresh address and persists a new, already `used`
    /// account.
    pub async fn allocate<C: ChainClient>(&self, mode: Mode, chain: &C) -> Result<Account, AccountError> {
        if let Some(account) = self.store.try_allocate(mode).await? {
            return Ok(account);
        }

        let address = chain.new_address().await?;
        let account = self.store.create(mode, address.assume_checked().to_string()).await?;
        info!(account_id = %account.id, %mode, "allocated new deposit address");
        Ok(account)
    }

    /// Releases an account back to the pool, called when a payment reaches
    /// a terminal state.
    pub async fn release(&self, account_id: AccountId) -> Result<Account, AccountError> {
        Ok(self.store.release(account_id).await?)
    }

    /// Overwrites `remainder`.
    pub async fn reset_remainder(&self, account_id: AccountId, remainder: Sats) -> Result<Account, AccountError> {
        Ok(self.store.set_remainder(account_id, remainder).await?)
    }

    /// Looks up an account by id, used by the engine's sweeps to resolve a
    /// payment's deposit address and remainder.
    pub async fn get(&self, account_id: AccountId) -> Result<Account, AccountError> {
        Ok(self.store.get(account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::StubChainClient;
    use crate::store::memory::MemoryAccountStore;

    #[tokio::test]
    async fn allocate_reuses_a_free_account_before_minting_a_new_one() {
        let store = MemoryAccountStore::default();
        let chain = StubChainClient::default();
        let reused = store.create(Mode::Test, "addr-reused".into()).await.unwrap();
        store.release(reused.id).await.unwrap();

        let pool = AccountPool::new(store);
        let allocated = pool.allocate(Mode::Test, &chain).await.unwrap();
        assert_eq!(allocated.id, reused.id);
        assert!(allocated.used);
    }

    #[tokio::test]
    async fn allocate_mints_a_new_address_when_none_are_free() {
        let store = MemoryAccountStore::default();
        let chain = StubChainClient::default();
        let pool = AccountPool::new(store);
        let allocated = pool.allocate(Mode::Test, &chain).await.unwrap();
        assert!(allocated.used);
        assert_eq!(allocated.remainder, Sats::ZERO);
    }
}
