//! In-process doubles for the signing-provider and contract boundaries:
//! a fake portal chain with manual mining control, a signer bound to it and
//! a scriptable gateway. Used by the integration tests and by the demo
//! binary.

use crate::{
    Result,
    abi::PortalSchema,
    client::{
        PortalApp,
        PortalConfig,
    },
    error::Error,
    provider::{
        ProviderGateway,
        RawLog,
        SignerHandle,
        TransactionHandle,
    },
    session::{
        SessionState,
        SessionStore,
    },
};
use alloy_dyn_abi::{
    DynSolValue,
    JsonAbiExt,
};
use alloy_primitives::{
    Address,
    B256,
    TxHash,
    U256,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{
        broadcast,
        oneshot,
    },
    task::JoinHandle,
    time,
};

pub fn portal_address() -> Address {
    Address::repeat_byte(0x42)
}

pub fn test_account(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

struct StoredWave {
    waver: Address,
    timestamp: u64,
    message: String,
}

struct QueuedTx {
    from: Address,
    message: String,
    reply: oneshot::Sender<std::result::Result<(), String>>,
}

struct ChainInner {
    waves: Vec<StoredWave>,
    clock: u64,
    next_tx: u64,
    queue: VecDeque<QueuedTx>,
    fail_reads: bool,
}

/// An in-memory WavePortal deployment. Broadcast transactions queue up until
/// `mine_next`/`fail_next` resolves them, so tests control exactly when the
/// mining window closes; mining applies the wave and emits the `NewWave`
/// log, mirroring the real contract.
#[derive(Clone)]
pub struct FakeChain {
    inner: Arc<Mutex<ChainInner>>,
    logs: broadcast::Sender<RawLog>,
    schema: Arc<PortalSchema>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        let (logs, _rx) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(ChainInner {
                waves: Vec::new(),
                clock: 1_700_000_000,
                next_tx: 0,
                queue: VecDeque::new(),
                fail_reads: false,
            })),
            logs,
            schema: Arc::new(PortalSchema::load().expect("embedded ABI parses")),
        }
    }

    /// History that predates the session under test. No log is emitted; the
    /// record is only reachable through `getAllWaves`.
    pub fn seed_wave(&self, from: Address, message: &str) {
        let mut inner = self.lock();
        let timestamp = advance_clock(&mut inner);
        inner.waves.push(StoredWave {
            waver: from,
            timestamp,
            message: message.to_owned(),
        });
    }

    /// A wave mined for some other portal user: applied immediately and
    /// announced through the event stream.
    pub fn external_wave(&self, from: Address, message: &str) {
        let timestamp = {
            let mut inner = self.lock();
            let timestamp = advance_clock(&mut inner);
            inner.waves.push(StoredWave {
                waver: from,
                timestamp,
                message: message.to_owned(),
            });
            timestamp
        };
        self.emit_new_wave(from, timestamp, message);
    }

    /// Mine the oldest queued transaction. Returns false if nothing was
    /// queued.
    pub fn mine_next(&self) -> bool {
        let Some(tx) = self.lock().queue.pop_front() else {
            return false;
        };
        let timestamp = {
            let mut inner = self.lock();
            let timestamp = advance_clock(&mut inner);
            inner.waves.push(StoredWave {
                waver: tx.from,
                timestamp,
                message: tx.message.clone(),
            });
            timestamp
        };
        self.emit_new_wave(tx.from, timestamp, &tx.message);
        let _ = tx.reply.send(Ok(()));
        true
    }

    /// Revert the oldest queued transaction without touching chain state.
    pub fn fail_next(&self, reason: &str) -> bool {
        let Some(tx) = self.lock().queue.pop_front() else {
            return false;
        };
        let _ = tx.reply.send(Err(reason.to_owned()));
        true
    }

    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Make every contract read fail until cleared. Broadcasts and the event
    /// stream are unaffected.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn wave_count(&self) -> u64 {
        self.lock().waves.len() as u64
    }

    /// Background miner for the demo binary: confirms whatever is queued on
    /// a fixed cadence.
    pub fn spawn_auto_miner(&self, every: Duration) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            loop {
                ticker.tick().await;
                chain.mine_next();
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainInner> {
        self.inner.lock().expect("fake chain lock")
    }

    fn emit_new_wave(&self, from: Address, timestamp: u64, message: &str) {
        let topics = vec![self.schema.new_wave.selector(), from.into_word()];
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(timestamp), 256),
            DynSolValue::String(message.to_owned()),
        ])
        .abi_encode_sequence()
        .expect("NewWave body encodes");
        // No subscribers is fine; the receiver count just happens to be zero.
        let _ = self.logs.send(RawLog {
            address: portal_address(),
            topics,
            data,
        });
    }

    fn handle_call(&self, to: Address, data: &[u8]) -> std::result::Result<Vec<u8>, String> {
        if to != portal_address() {
            return Err(format!("no contract at {to}"));
        }
        if self.lock().fail_reads {
            return Err("read endpoint unavailable".into());
        }
        let selector = data.get(..4).ok_or("calldata shorter than a selector")?;
        if selector == self.schema.wave_count.selector().as_slice() {
            let count = self.wave_count();
            let encoded = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(count), 256)])
                .abi_encode_sequence()
                .expect("uint encodes");
            Ok(encoded)
        } else if selector == self.schema.get_all_waves.selector().as_slice() {
            let inner = self.lock();
            let items = inner
                .waves
                .iter()
                .map(|wave| {
                    DynSolValue::Tuple(vec![
                        DynSolValue::Address(wave.waver),
                        DynSolValue::Uint(U256::from(wave.timestamp), 256),
                        DynSolValue::String(wave.message.clone()),
                    ])
                })
                .collect();
            let encoded = DynSolValue::Tuple(vec![DynSolValue::Array(items)])
                .abi_encode_sequence()
                .expect("wave array encodes");
            Ok(encoded)
        } else {
            Err(format!("unknown selector {selector:02x?}"))
        }
    }

    fn submit(
        &self,
        from: Address,
        data: &[u8],
        gas_limit: u64,
    ) -> std::result::Result<TransactionHandle, String> {
        if gas_limit == 0 {
            return Err("zero gas limit".into());
        }
        let selector = data.get(..4).ok_or("calldata shorter than a selector")?;
        if selector != self.schema.wave.selector().as_slice() {
            return Err(format!("unknown selector {selector:02x?}"));
        }
        let args = self
            .schema
            .wave
            .abi_decode_input(&data[4..])
            .map_err(|e| e.to_string())?;
        let message = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or("wave expects a string argument")?
            .to_owned();

        let mut inner = self.lock();
        inner.next_tx += 1;
        let hash: TxHash = B256::from(U256::from(inner.next_tx));
        let (reply, rx) = oneshot::channel();
        inner.queue.push_back(QueuedTx {
            from,
            message,
            reply,
        });
        Ok(TransactionHandle::new(hash, rx))
    }
}

/// Signer bound to one fake-chain account.
#[derive(Clone)]
pub struct FakeSigner {
    chain: FakeChain,
    account: Address,
}

impl FakeSigner {
    pub fn new(chain: FakeChain, account: Address) -> Self {
        Self { chain, account }
    }
}

impl SignerHandle for FakeSigner {
    fn account(&self) -> Address {
        self.account
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        self.chain.handle_call(to, &data).map_err(Error::Rpc)
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_limit: u64,
    ) -> Result<TransactionHandle> {
        if to != portal_address() {
            return Err(Error::Rpc(format!("no contract at {to}")));
        }
        self.chain
            .submit(self.account, &data, gas_limit)
            .map_err(Error::Rpc)
    }

    async fn subscribe_logs(&self, _address: Address) -> Result<broadcast::Receiver<RawLog>> {
        Ok(self.chain.logs.subscribe())
    }
}

struct GatewayInner {
    available: bool,
    reject: bool,
    account: Address,
    authorized: Vec<Address>,
    prompts: u32,
}

/// Scriptable signing provider: availability, authorization state and the
/// user's answer to the connection prompt are all under test control.
#[derive(Clone)]
pub struct FakeGateway {
    chain: FakeChain,
    inner: Arc<Mutex<GatewayInner>>,
}

impl FakeGateway {
    pub fn new(chain: FakeChain, account: Address) -> Self {
        Self::with_state(chain, account, true, Vec::new())
    }

    /// Simulates a user who already authorized this account in an earlier
    /// visit.
    pub fn pre_authorized(chain: FakeChain, account: Address) -> Self {
        Self::with_state(chain, account, true, vec![account])
    }

    /// An environment without any signing capability.
    pub fn unavailable(chain: FakeChain) -> Self {
        Self::with_state(chain, test_account(0), false, Vec::new())
    }

    fn with_state(
        chain: FakeChain,
        account: Address,
        available: bool,
        authorized: Vec<Address>,
    ) -> Self {
        Self {
            chain,
            inner: Arc::new(Mutex::new(GatewayInner {
                available,
                reject: false,
                account,
                authorized,
                prompts: 0,
            })),
        }
    }

    /// Make the user decline the next (and all following) prompts.
    pub fn set_reject(&self, reject: bool) {
        self.lock().reject = reject;
    }

    /// How many times the user has been prompted.
    pub fn prompt_count(&self) -> u32 {
        self.lock().prompts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayInner> {
        self.inner.lock().expect("fake gateway lock")
    }
}

impl ProviderGateway for FakeGateway {
    type Signer = FakeSigner;

    fn is_available(&self) -> bool {
        self.lock().available
    }

    async fn get_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.lock().authorized.clone())
    }

    async fn request_connection(&self) -> Result<Address> {
        let mut inner = self.lock();
        if !inner.available {
            return Err(Error::NoProvider);
        }
        inner.prompts += 1;
        if inner.reject {
            return Err(Error::UserRejected);
        }
        let account = inner.account;
        if !inner.authorized.contains(&account) {
            inner.authorized.push(account);
        }
        Ok(account)
    }

    fn signer(&self) -> Result<FakeSigner> {
        let inner = self.lock();
        if inner.authorized.is_empty() {
            return Err(Error::SignerUnavailable);
        }
        Ok(FakeSigner::new(self.chain.clone(), inner.account))
    }
}

/// One fake chain plus a gateway for the default test account.
pub struct TestContext {
    pub chain: FakeChain,
    pub gateway: FakeGateway,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let chain = FakeChain::new();
        let gateway = FakeGateway::new(chain.clone(), test_account(0xa1));
        Self { chain, gateway }
    }

    pub fn account(&self) -> Address {
        test_account(0xa1)
    }

    pub fn app(&self) -> PortalApp<FakeGateway> {
        PortalApp::new(self.gateway.clone(), PortalConfig::new(portal_address()))
            .expect("embedded ABI parses")
    }
}

/// Await a store condition, failing the test after two seconds.
pub async fn wait_for(store: &SessionStore, mut pred: impl FnMut(&SessionState) -> bool) {
    let mut rx = store.subscribe();
    time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("store condition not reached in time");
}

fn advance_clock(inner: &mut ChainInner) -> u64 {
    inner.clock += 12;
    inner.clock
}
