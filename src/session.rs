use crate::tracker::{
    PendingTransaction,
    TxState,
};
use alloy_primitives::{
    Address,
    TxHash,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{
    debug,
    warn,
};

const MAX_STORED_ERRORS: usize = 50;

/// One wave as recorded on chain. Immutable once constructed; two records
/// with the same address, timestamp and message describe the same on-chain
/// event regardless of which channel delivered them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaveRecord {
    pub address: Address,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl WaveRecord {
    pub fn from_parts(address: Address, unix_secs: u64, message: String) -> Self {
        let timestamp = DateTime::from_timestamp(unix_secs as i64, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            address,
            timestamp,
            message,
        }
    }
}

/// The reconciled, presentation-facing state. Account identity, the mirrored
/// contract state, the user's draft and the mining flag all live here and
/// nowhere else.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionState {
    pub account: Option<Address>,
    pub connected: bool,
    pub wave_count: u64,
    pub wave_history: Vec<WaveRecord>,
    pub draft: String,
    pub mining: bool,
    pub pending: Option<PendingTransaction>,
    pub status: String,
    pub errors: Vec<String>,
}

/// Single source of truth for the session. Backed by a watch channel so the
/// presentation layer can await changes; every mutation goes through one of
/// the methods below, which enforce the monotonic-count and no-duplicate
/// invariants no matter how concurrent flows interleave.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn set_session(&self, account: Address) {
        self.tx.send_modify(|s| {
            s.account = Some(account);
            s.connected = true;
        });
    }

    pub fn clear_session(&self) {
        self.tx.send_modify(|s| {
            s.account = None;
            s.connected = false;
            s.mining = false;
            s.pending = None;
        });
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        let draft = draft.into();
        self.tx.send_modify(|s| s.draft = draft);
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.tx.send_modify(|s| s.status = status);
    }

    pub fn push_error(&self, error: impl Into<String>) {
        let error = error.into();
        warn!("{error}");
        self.tx.send_modify(|s| push_bounded(&mut s.errors, error));
    }

    /// Mirror the on-chain wave count. The count only ever advances within a
    /// session; a lower value is logged and ignored, never applied.
    pub fn set_wave_count(&self, count: u64) -> bool {
        self.tx.send_if_modified(|s| {
            if count < s.wave_count {
                warn!(
                    current = s.wave_count,
                    proposed = count,
                    "ignoring wave count regression"
                );
                return false;
            }
            if count == s.wave_count {
                return false;
            }
            s.wave_count = count;
            true
        })
    }

    /// Append a wave unless an identical record is already present. Snapshot
    /// reads and the live event stream overlap for the same on-chain wave;
    /// whichever source delivers first wins and the later copy is dropped.
    pub fn append_wave_if_new(&self, record: WaveRecord) -> bool {
        self.tx.send_if_modified(|s| {
            if s.wave_history.contains(&record) {
                debug!(address = %record.address, "duplicate wave suppressed");
                return false;
            }
            s.wave_history.push(record);
            true
        })
    }

    /// Entered the instant the broadcast step returns a handle: the draft is
    /// cleared exactly here, never at confirmation.
    pub(crate) fn mark_submitted(&self, hash: TxHash) {
        self.tx.send_modify(|s| {
            s.pending = Some(PendingTransaction {
                hash,
                state: TxState::Mining,
            });
            s.mining = true;
            s.draft.clear();
            s.status = format!("wave {hash} broadcast, mining...");
        });
    }

    /// Completion paths carry the hash of the transaction they finished, and
    /// mutate nothing unless that transaction is still the pending one. A
    /// wait that outlived its binding must not touch a later submission.
    pub(crate) fn mark_confirmed(&self, hash: TxHash) {
        self.tx.send_modify(|s| match &mut s.pending {
            Some(pending) if pending.hash == hash => {
                pending.state = TxState::Confirmed;
                s.status = format!("wave {hash} mined");
            }
            _ => warn!(%hash, "confirmation for a transaction no longer pending"),
        });
    }

    /// Back to idle after a confirmed transaction's refresh has run.
    pub(crate) fn clear_pending(&self, hash: TxHash) {
        self.tx.send_modify(|s| {
            if s.pending.map(|p| p.hash) == Some(hash) {
                s.pending = None;
                s.mining = false;
            }
        });
    }

    /// Back to idle after a failed transaction; the mirrored contract state
    /// is deliberately left untouched.
    pub(crate) fn mark_failed(&self, hash: TxHash, reason: &str) {
        self.tx.send_modify(|s| {
            if s.pending.map(|p| p.hash) != Some(hash) {
                warn!(%hash, "failure for a transaction no longer pending");
                return;
            }
            s.pending = None;
            s.mining = false;
            s.status = "wave failed".into();
            push_bounded(&mut s.errors, reason.to_owned());
        });
    }
}

fn push_bounded(errors: &mut Vec<String>, error: String) {
    errors.push(error);
    if errors.len() > MAX_STORED_ERRORS {
        let drain = errors.len() - MAX_STORED_ERRORS;
        errors.drain(0..drain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(addr_byte: u8, secs: u64, message: &str) -> WaveRecord {
        WaveRecord::from_parts(Address::repeat_byte(addr_byte), secs, message.into())
    }

    #[test]
    fn append_wave_if_new__drops_exact_duplicates() {
        let store = SessionStore::new();
        // given
        let wave = record(0x11, 1_700_000_000, "gm");
        assert!(store.append_wave_if_new(wave.clone()));
        // when
        let appended = store.append_wave_if_new(wave.clone());
        // then
        assert!(!appended);
        assert_eq!(store.snapshot().wave_history, vec![wave]);
    }

    #[test]
    fn append_wave_if_new__same_message_different_timestamp_is_distinct() {
        let store = SessionStore::new();
        store.append_wave_if_new(record(0x11, 1_700_000_000, "gm"));
        assert!(store.append_wave_if_new(record(0x11, 1_700_000_012, "gm")));
        assert_eq!(store.snapshot().wave_history.len(), 2);
    }

    #[test]
    fn set_wave_count__lower_value_is_ignored() {
        let store = SessionStore::new();
        assert!(store.set_wave_count(5));
        assert!(!store.set_wave_count(3));
        assert_eq!(store.snapshot().wave_count, 5);
    }

    #[test]
    fn mark_failed__ignores_a_stale_transaction_hash() {
        let store = SessionStore::new();
        let live = TxHash::repeat_byte(0x01);
        store.mark_submitted(live);
        // a wait from a replaced binding resolves with its own hash
        store.mark_failed(TxHash::repeat_byte(0x02), "dropped");
        let snap = store.snapshot();
        assert!(snap.mining);
        assert_eq!(snap.pending.unwrap().hash, live);
        assert!(snap.errors.is_empty());
        // the live transaction's failure still lands
        store.mark_failed(live, "reverted");
        assert!(!store.snapshot().mining);
    }

    #[test]
    fn clear_pending__ignores_a_stale_transaction_hash() {
        let store = SessionStore::new();
        let live = TxHash::repeat_byte(0x01);
        store.mark_submitted(live);
        store.clear_pending(TxHash::repeat_byte(0x02));
        assert!(store.snapshot().mining);
        store.clear_pending(live);
        assert!(!store.snapshot().mining);
    }

    #[test]
    fn mark_failed__error_log_stays_bounded() {
        let store = SessionStore::new();
        let hash = TxHash::repeat_byte(0x01);
        for i in 0..60 {
            store.mark_submitted(hash);
            store.mark_failed(hash, &format!("boom {i}"));
        }
        let errors = store.snapshot().errors;
        assert_eq!(errors.len(), 50);
        assert_eq!(errors.last().unwrap(), "boom 59");
    }

    #[test]
    fn push_error__keeps_at_most_fifty() {
        let store = SessionStore::new();
        for i in 0..60 {
            store.push_error(format!("boom {i}"));
        }
        let errors = store.snapshot().errors;
        assert_eq!(errors.len(), 50);
        assert_eq!(errors.last().unwrap(), "boom 59");
    }

    proptest! {
        #[test]
        fn append_wave_if_new__history_holds_each_record_once(
            deliveries in prop::collection::vec(
                (0u8..3, 0u64..4, "[ab]{0,2}"),
                0..40,
            )
        ) {
            let store = SessionStore::new();
            let mut expected: Vec<WaveRecord> = Vec::new();
            for (addr, secs, message) in deliveries {
                let wave = record(addr, secs, &message);
                if !expected.contains(&wave) {
                    expected.push(wave.clone());
                }
                store.append_wave_if_new(wave);
            }
            // insertion order of first arrivals, each distinct record once
            prop_assert_eq!(store.snapshot().wave_history, expected);
        }

        #[test]
        fn set_wave_count__stored_value_is_running_max(
            counts in prop::collection::vec(any::<u64>(), 1..40)
        ) {
            let store = SessionStore::new();
            let mut max = 0u64;
            for count in counts {
                store.set_wave_count(count);
                max = max.max(count);
                prop_assert_eq!(store.snapshot().wave_count, max);
            }
        }
    }
}
