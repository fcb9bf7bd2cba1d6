use crate::{
    Result,
    abi::PortalSchema,
    error::Error,
    provider::{
        RawLog,
        SignerHandle,
        TransactionHandle,
    },
    session::WaveRecord,
};
use alloy_dyn_abi::{
    DynSolValue,
    FunctionExt,
    JsonAbiExt,
};
use alloy_primitives::Address;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The portal rejects messages longer than this, so the client refuses to
/// broadcast them at all.
pub const MAX_WAVE_LEN: usize = 100;

/// Gas limit the original deployment was tuned for.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// Typed operations against one fixed portal deployment, bound to the active
/// signer. Holds no state beyond the binding itself; replaced wholesale on
/// reconnect.
pub struct ContractClient<S> {
    address: Address,
    schema: Arc<PortalSchema>,
    signer: S,
    gas_limit: u64,
}

impl<S: SignerHandle> ContractClient<S> {
    pub fn new(address: Address, schema: Arc<PortalSchema>, signer: S, gas_limit: u64) -> Self {
        Self {
            address,
            schema,
            signer,
            gas_limit,
        }
    }

    pub fn account(&self) -> Address {
        self.signer.account()
    }

    pub fn schema(&self) -> Arc<PortalSchema> {
        self.schema.clone()
    }

    /// Current number of waves recorded by the portal. Pure read, safe to
    /// call concurrently and repeatedly.
    pub async fn read_wave_count(&self) -> Result<u64> {
        let call = self.schema.wave_count.abi_encode_input(&[])?;
        let raw = self
            .signer
            .call(self.address, call)
            .await
            .map_err(Error::into_read_failure)?;
        let values = self.schema.wave_count.abi_decode_output(&raw)?;
        values
            .first()
            .and_then(|v| v.as_uint())
            .map(|(count, _bits)| count.saturating_to())
            .ok_or_else(|| Error::Schema("waveCount did not return a uint".into()))
    }

    /// Full remote history snapshot at call time. No incremental fetch; the
    /// store's append de-duplication absorbs the overlap with live events.
    pub async fn read_all_waves(&self) -> Result<Vec<WaveRecord>> {
        let call = self.schema.get_all_waves.abi_encode_input(&[])?;
        let raw = self
            .signer
            .call(self.address, call)
            .await
            .map_err(Error::into_read_failure)?;
        let values = self.schema.get_all_waves.abi_decode_output(&raw)?;
        let Some(DynSolValue::Array(items)) = values.into_iter().next() else {
            return Err(Error::Schema("getAllWaves did not return an array".into()));
        };
        items.iter().map(decode_wave_tuple).collect()
    }

    /// Sign and broadcast one wave. Returns as soon as the transaction is
    /// accepted for broadcast; confirmation is the caller's concern.
    pub async fn submit_wave(&self, message: &str) -> Result<TransactionHandle> {
        let len = message.chars().count();
        if len > MAX_WAVE_LEN {
            return Err(Error::InvalidInput { len });
        }
        let call = self
            .schema
            .wave
            .abi_encode_input(&[DynSolValue::String(message.to_owned())])?;
        self.signer
            .send_transaction(self.address, call, self.gas_limit)
            .await
            .map_err(|e| match e {
                Error::Rpc(msg) => Error::TransactionFailed(msg),
                other => other,
            })
    }

    /// Raw log subscription for this portal. Decoding happens in the event
    /// subscriber.
    pub async fn subscribe_new_waves(&self) -> Result<broadcast::Receiver<RawLog>> {
        self.signer.subscribe_logs(self.address).await
    }
}

fn decode_wave_tuple(value: &DynSolValue) -> Result<WaveRecord> {
    let fields = value
        .as_tuple()
        .ok_or_else(|| Error::Schema("wave entry is not a tuple".into()))?;
    let address = fields
        .first()
        .and_then(|v| v.as_address())
        .ok_or_else(|| Error::Schema("wave entry missing waver address".into()))?;
    let timestamp = fields
        .get(1)
        .and_then(|v| v.as_uint())
        .map(|(secs, _bits)| secs.saturating_to())
        .ok_or_else(|| Error::Schema("wave entry missing timestamp".into()))?;
    let message = fields
        .get(2)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Schema("wave entry missing message".into()))?;
    Ok(WaveRecord::from_parts(address, timestamp, message.to_owned()))
}
