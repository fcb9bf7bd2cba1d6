use crate::{
    Result,
    contract::ContractClient,
    error::Error,
    provider::SignerHandle,
    session::SessionStore,
};
use alloy_primitives::TxHash;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{
    info,
    warn,
};

/// Lifecycle of the single in-flight write. `Submitted` and `Mining` are
/// entered together: the portal gives no separate mempool-acceptance signal,
/// so the tracker goes straight to waiting on the confirmation primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TxState {
    Submitted,
    Mining,
    Confirmed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub state: TxState,
}

/// Drives one wave from broadcast to confirmation and reconciles the result
/// into the store. At most one transaction is outstanding at a time; the
/// permit is taken synchronously at `submit` entry, so no interleaving can
/// slip a second broadcast through while one is pending. The permit belongs
/// to the session, not the tracker: a rebuilt tracker after a reconnect
/// shares it with any still-running wait.
pub struct TransactionTracker<S: SignerHandle> {
    client: Arc<ContractClient<S>>,
    store: SessionStore,
    permit: Arc<Mutex<()>>,
}

impl<S: SignerHandle> Clone for TransactionTracker<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: self.store.clone(),
            permit: self.permit.clone(),
        }
    }
}

impl<S: SignerHandle> TransactionTracker<S> {
    pub fn new(
        client: Arc<ContractClient<S>>,
        store: SessionStore,
        permit: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            client,
            store,
            permit,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.permit.try_lock().is_ok()
    }

    /// Submit one wave and see it through to idle. Resolves with the
    /// transaction hash once the wave is confirmed and the post-confirmation
    /// refresh has run.
    pub async fn submit(&self, message: impl Into<String>) -> Result<TxHash> {
        let message = message.into();
        let Ok(_permit) = self.permit.try_lock() else {
            return Err(Error::TransactionInFlight);
        };

        // Mirror the on-chain count before broadcasting, as the original
        // client does on every wave.
        match self.client.read_wave_count().await {
            Ok(count) => {
                self.store.set_wave_count(count);
            }
            Err(e) => warn!(error = %e, "pre-submit wave count read failed"),
        }

        let handle = match self.client.submit_wave(&message).await {
            Ok(handle) => handle,
            Err(e) => {
                self.store.push_error(format!("wave not broadcast: {e}"));
                return Err(e);
            }
        };
        let hash = handle.hash();
        // Submitted: draft cleared and mining flag raised right here, not at
        // confirmation.
        self.store.mark_submitted(hash);
        info!(%hash, "wave broadcast");

        match handle.confirmed().await {
            Ok(()) => {
                self.store.mark_confirmed(hash);
                info!(%hash, "wave confirmed");
                self.refresh_after_confirmation().await;
                self.store.clear_pending(hash);
                Ok(hash)
            }
            Err(e) => {
                warn!(%hash, error = %e, "wave failed");
                self.store.mark_failed(hash, &e.to_string());
                Err(e)
            }
        }
    }

    /// Fresh count and history reads after a confirmation. A failure here is
    /// transient: the transaction is already on chain and the next scheduled
    /// poll will catch the store up.
    async fn refresh_after_confirmation(&self) {
        match self.client.read_wave_count().await {
            Ok(count) => {
                self.store.set_wave_count(count);
            }
            Err(e) => warn!(error = %e, "post-confirmation count read failed"),
        }
        match self.client.read_all_waves().await {
            Ok(waves) => {
                for wave in waves {
                    self.store.append_wave_if_new(wave);
                }
            }
            Err(e) => warn!(error = %e, "post-confirmation history read failed"),
        }
    }
}
