use crate::{
    Result,
    error::Error,
};
use alloy_primitives::{
    Address,
    B256,
    TxHash,
};
use std::future::Future;
use tokio::sync::{
    broadcast,
    oneshot,
};

/// An undecoded contract log as delivered by the provider's subscription
/// channel. Topic zero is the event selector.
#[derive(Clone, Debug)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

/// Handle for a broadcast transaction. Obtained the moment the signed
/// transaction is accepted for broadcast; `confirmed` resolves once the
/// transaction is mined (or dropped/reverted).
#[derive(Debug)]
pub struct TransactionHandle {
    hash: TxHash,
    rx: oneshot::Receiver<std::result::Result<(), String>>,
}

impl TransactionHandle {
    pub fn new(hash: TxHash, rx: oneshot::Receiver<std::result::Result<(), String>>) -> Self {
        Self { hash, rx }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait for inclusion. There is no client-side cancellation once the
    /// transaction has been broadcast.
    pub async fn confirmed(self) -> Result<()> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(Error::TransactionFailed(reason)),
            Err(_) => Err(Error::TransactionFailed(
                "confirmation channel closed before the transaction was mined".into(),
            )),
        }
    }
}

/// Raw call/sign primitives bound to one account. Replaced wholesale when the
/// session reconnects; holders must never mutate a stale handle in place.
pub trait SignerHandle: Clone + Send + Sync + 'static {
    fn account(&self) -> Address;

    /// Read-only contract call (no state change, no prompt).
    fn call(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Sign and broadcast a state-changing call. Returns as soon as the
    /// transaction is accepted for broadcast.
    fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_limit: u64,
    ) -> impl Future<Output = Result<TransactionHandle>> + Send;

    /// Subscribe to logs emitted by the given contract.
    fn subscribe_logs(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<broadcast::Receiver<RawLog>>> + Send;
}

/// The injected signing provider. `request_connection` is the only operation
/// that may prompt the user, and it prompts at most once per call; a
/// rejection is terminal for that call, never retried internally.
pub trait ProviderGateway: Send + Sync + 'static {
    type Signer: SignerHandle;

    fn is_available(&self) -> bool;

    /// Accounts the user has already authorized. Non-interactive; may be
    /// empty without ever prompting.
    fn get_accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// Ask the user to authorize an account. Fails with `NoProvider` or
    /// `UserRejected`.
    fn request_connection(&self) -> impl Future<Output = Result<Address>> + Send;

    /// A signer for the currently authorized account, or `SignerUnavailable`.
    fn signer(&self) -> Result<Self::Signer>;
}
