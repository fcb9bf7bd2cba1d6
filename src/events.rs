use crate::{
    Result,
    contract::ContractClient,
    error::Error,
    provider::{
        RawLog,
        SignerHandle,
    },
    session::{
        SessionStore,
        WaveRecord,
    },
};
use alloy_dyn_abi::EventExt;
use alloy_json_abi::Event;
use tokio::{
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};
use tracing::{
    debug,
    warn,
};

/// Forwards decoded `NewWave` events into the store for as long as the
/// current binding lives. Dropping the subscriber aborts the forwarding task,
/// which is what prevents duplicate handler registration across reconnects.
pub struct EventSubscriber {
    task: JoinHandle<()>,
}

impl EventSubscriber {
    pub async fn spawn<S: SignerHandle>(
        client: &ContractClient<S>,
        store: SessionStore,
    ) -> Result<Self> {
        let mut logs = client.subscribe_new_waves().await?;
        let event = client.schema().new_wave.clone();
        let task = tokio::spawn(async move {
            loop {
                match logs.recv().await {
                    Ok(log) => match decode_new_wave(&event, &log) {
                        Ok(record) => {
                            debug!(address = %record.address, "NewWave delivered");
                            store.append_wave_if_new(record);
                        }
                        Err(e) => warn!(error = %e, "dropping undecodable NewWave log"),
                    },
                    Err(RecvError::Lagged(missed)) => {
                        // The next history snapshot poll backfills anything
                        // missed here.
                        warn!(missed, "event subscription lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(Self { task })
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Decode a raw `NewWave(address indexed from, uint256 timestamp, string
/// message)` log into a wave record.
pub fn decode_new_wave(event: &Event, log: &RawLog) -> Result<WaveRecord> {
    let decoded = event.decode_log_parts(log.topics.iter().copied(), &log.data)?;
    let from = decoded
        .indexed
        .first()
        .and_then(|v| v.as_address())
        .ok_or_else(|| Error::Schema("NewWave missing indexed sender".into()))?;
    let timestamp = decoded
        .body
        .first()
        .and_then(|v| v.as_uint())
        .map(|(secs, _bits)| secs.saturating_to())
        .ok_or_else(|| Error::Schema("NewWave missing timestamp".into()))?;
    let message = decoded
        .body
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Schema("NewWave missing message".into()))?;
    Ok(WaveRecord::from_parts(from, timestamp, message.to_owned()))
}
