use crate::{
    Result,
    abi::PortalSchema,
    contract::{
        ContractClient,
        DEFAULT_GAS_LIMIT,
    },
    error::Error,
    events::EventSubscriber,
    provider::{
        ProviderGateway,
        SignerHandle,
    },
    session::SessionStore,
    tracker::TransactionTracker,
};
use alloy_primitives::{
    Address,
    TxHash,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{
    info,
    warn,
};

/// The one portal deployment this client talks to, plus the fixed gas limit
/// passed with every `wave` call.
#[derive(Clone, Copy, Debug)]
pub struct PortalConfig {
    pub contract_address: Address,
    pub gas_limit: u64,
}

impl PortalConfig {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Everything that is replaced wholesale when the session (re)connects.
struct Binding<S: SignerHandle> {
    client: Arc<ContractClient<S>>,
    tracker: TransactionTracker<S>,
    // Held only for its drop: tears the event subscription down with the
    // binding it belongs to.
    _events: EventSubscriber,
}

/// The coordinator. Owns the provider gateway, the current binding and the
/// session store; the presentation layer sees the store's fields and the
/// connect / set_draft / submit actions, nothing else.
pub struct PortalApp<P: ProviderGateway> {
    gateway: P,
    config: PortalConfig,
    schema: Arc<PortalSchema>,
    store: SessionStore,
    // The single-submission permit outlives any one binding; a reconnect
    // while a wave is mining must not hand out a fresh, unlocked permit.
    permit: Arc<Mutex<()>>,
    binding: Option<Binding<P::Signer>>,
}

impl<P: ProviderGateway> PortalApp<P> {
    pub fn new(gateway: P, config: PortalConfig) -> Result<Self> {
        let schema = Arc::new(PortalSchema::load()?);
        let store = SessionStore::new();
        store.set_status("wallet not connected");
        Ok(Self {
            gateway,
            config,
            schema,
            store,
            permit: Arc::new(Mutex::new(())),
            binding: None,
        })
    }

    pub fn store(&self) -> SessionStore {
        self.store.clone()
    }

    pub fn connected(&self) -> bool {
        self.binding.is_some()
    }

    pub fn tracker(&self) -> Option<TransactionTracker<P::Signer>> {
        self.binding.as_ref().map(|b| b.tracker.clone())
    }

    /// Load-time check: bind silently if the user authorized an account in a
    /// previous interaction. Never prompts; a missing provider or an empty
    /// account list is a notice, not an error.
    pub async fn check_existing_connection(&mut self) -> Result<Option<Address>> {
        if !self.gateway.is_available() {
            info!("no signing provider detected");
            self.store.set_status("no signing provider detected");
            return Ok(None);
        }
        let accounts = match self.gateway.get_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "account enumeration failed");
                return Ok(None);
            }
        };
        match accounts.first() {
            Some(&account) => {
                info!(%account, "found an authorized account");
                self.bind(account).await?;
                Ok(Some(account))
            }
            None => {
                info!("no authorized account found");
                self.store.set_status("wallet not connected");
                Ok(None)
            }
        }
    }

    /// Interactive connect. Prompts the user at most once; a rejection is
    /// terminal for this call and the user may simply try again.
    pub async fn connect(&mut self) -> Result<Address> {
        if !self.gateway.is_available() {
            self.store.push_error("no signing provider detected");
            return Err(Error::NoProvider);
        }
        let account = match self.gateway.request_connection().await {
            Ok(account) => account,
            Err(e) => {
                self.store.push_error(e.to_string());
                return Err(e);
            }
        };
        self.bind(account).await?;
        Ok(account)
    }

    async fn bind(&mut self, account: Address) -> Result<()> {
        // Tear the previous subscription down before the binding is
        // replaced; a stale binding must never keep forwarding.
        self.binding = None;
        let signer = self.gateway.signer()?;
        let client = Arc::new(ContractClient::new(
            self.config.contract_address,
            self.schema.clone(),
            signer,
            self.config.gas_limit,
        ));
        let events = EventSubscriber::spawn(&client, self.store.clone()).await?;
        let tracker =
            TransactionTracker::new(client.clone(), self.store.clone(), self.permit.clone());
        self.binding = Some(Binding {
            client,
            tracker,
            _events: events,
        });
        self.store.set_session(account);
        self.store.set_status(format!("connected as {account}"));
        info!(%account, "session established");
        self.refresh().await;
        Ok(())
    }

    /// Scheduled poll of the mirrored contract state. A failed read is
    /// transient: logged, and retried on the next tick only.
    pub async fn refresh(&self) {
        let Some(binding) = &self.binding else {
            return;
        };
        match binding.client.read_wave_count().await {
            Ok(count) => {
                self.store.set_wave_count(count);
            }
            Err(e) => warn!(error = %e, "wave count poll failed"),
        }
        match binding.client.read_all_waves().await {
            Ok(waves) => {
                for wave in waves {
                    self.store.append_wave_if_new(wave);
                }
            }
            Err(e) => warn!(error = %e, "wave history poll failed"),
        }
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.store.set_draft(draft);
    }

    /// Submit the current draft and drive it through to idle. Used directly
    /// by tests; the binary goes through `spawn_submit` to keep the UI live.
    pub async fn submit_draft(&self) -> Result<TxHash> {
        let Some(binding) = &self.binding else {
            return Err(Error::SignerUnavailable);
        };
        let draft = self.store.snapshot().draft;
        binding.tracker.submit(draft).await
    }

    /// Fire-and-forget submission for the UI loop. Lifecycle errors land in
    /// the store.
    pub fn spawn_submit(&self) -> bool {
        let Some(binding) = &self.binding else {
            self.store.push_error("connect a wallet before waving");
            return false;
        };
        let draft = self.store.snapshot().draft;
        if draft.is_empty() {
            self.store.set_status("type a message first");
            return false;
        }
        let tracker = binding.tracker.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(Error::TransactionInFlight) = tracker.submit(draft).await {
                // Other failures are recorded by the tracker itself.
                store.push_error("a wave is already being mined");
            }
        });
        true
    }

    pub fn disconnect(&mut self) {
        self.binding = None;
        self.store.clear_session();
        self.store.set_status("disconnected");
        info!("session cleared");
    }
}
