use thiserror::Error;

/// Everything the coordinator can surface to the presentation layer. None of
/// these tear the session down; after any of them the client is back in a
/// stable idle state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no signing provider is available in this environment")]
    NoProvider,

    #[error("the user rejected the connection request")]
    UserRejected,

    #[error("message is {len} characters, the portal accepts at most 100")]
    InvalidInput { len: usize },

    #[error("no signer is bound; connect a wallet first")]
    SignerUnavailable,

    #[error("a wave transaction is already in flight")]
    TransactionInFlight,

    #[error("wave transaction failed: {0}")]
    TransactionFailed(String),

    #[error("contract read failed: {0}")]
    ReadFailure(String),

    #[error("interface schema mismatch: {0}")]
    Schema(String),

    #[error("provider call failed: {0}")]
    Rpc(String),

    #[error(transparent)]
    Abi(#[from] alloy_dyn_abi::Error),
}

impl Error {
    /// Collapse a transport-level failure into the read-failure bucket used
    /// by polled reads.
    pub(crate) fn into_read_failure(self) -> Self {
        match self {
            Self::Rpc(msg) => Self::ReadFailure(msg),
            other => other,
        }
    }
}
