//! Pairing orchestrator.
//!
//! [PairingManager] validates barcode, builds network credentials, finds the device over radio,
//! connects to it and hands it over to the device controller. Progress is reported through
//! [EventSink](crate::events::EventSink) as events carrying the caller's request id:
//! `onStartScanning` → `onStartConnecting` → `onStartPairing` → `onPairingSuccess` | `onPairingFail`,
//! or `onStartScanning` → `onScanFail`. Every session ends with exactly one terminal event.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use matpair::{credentials::HubInfo, events::ChannelSink, pairing::{Collaborators, PairingConfig, PairingManager}, simulated};
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let (sink, mut events) = ChannelSink::new();
//! let radio = Arc::new(simulated::SimulatedRadio::new().with_device(3840, "AA:01"));
//! let controller = Arc::new(simulated::SimulatedController::new());
//! let factory = Arc::new(simulated::SimulatedControllerFactory::new(controller));
//! let pm = PairingManager::new(PairingConfig::default(), Collaborators::new(radio, factory, sink));
//! let hub = HubInfo::thread(15, 0xffff, "1122334455667788", "00112233445566778899aabbccddeeff");
//! pm.pair_device("MT:Y.K9042C00KA0648G00", hub, "req-1");
//! while let Some(e) = events.recv().await {
//!     println!("{}", e.to_json()?);
//!     if e.kind.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod devid;
mod router;

pub use config::{PairingConfig, SessionPolicy};
pub use devid::DeviceIdAllocator;

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    sync::{oneshot, OnceCell},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    controller::{ControllerFactory, DeviceController},
    credentials::{HubInfo, NetworkCredentials},
    error::PairingError,
    events::{EventKind, EventSink, PairingEvent},
    onboarding::{DefaultParser, SetupPayloadParser},
    transport::{RadioTransport, TransportHandle},
};

/// External parts the manager drives.
pub struct Collaborators {
    pub radio: Arc<dyn RadioTransport>,
    pub controller_factory: Arc<dyn ControllerFactory>,
    pub events: Arc<dyn EventSink>,
    pub parser: Arc<dyn SetupPayloadParser>,
}

impl Collaborators {
    /// Collaborators with [DefaultParser].
    pub fn new(
        radio: Arc<dyn RadioTransport>,
        controller_factory: Arc<dyn ControllerFactory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            radio,
            controller_factory,
            events,
            parser: Arc::new(DefaultParser),
        }
    }
}

/// Result of successful pairing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOutcome {
    pub session_id: String,
    pub device_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingState {
    ParsingBarcode,
    BuildingCredentials,
    ScanningDevice,
    Connecting,
    Pairing,
    AwaitingCommissioning,
}

pub struct PairingManager {
    config: PairingConfig,
    radio: Arc<dyn RadioTransport>,
    controller_factory: Arc<dyn ControllerFactory>,
    events: Arc<dyn EventSink>,
    parser: Arc<dyn SetupPayloadParser>,
    controller: OnceCell<Arc<dyn DeviceController>>,
    router: Arc<router::SessionRouter>,
    device_ids: DeviceIdAllocator,
    sessions: std::sync::Mutex<HashMap<String, CancellationToken>>,
    controller_lock: tokio::sync::Mutex<()>,
    controller_closed: AtomicBool,
    shutdown: CancellationToken,
}

impl PairingManager {
    /// Manager with in-memory device id allocation.
    pub fn new(config: PairingConfig, collaborators: Collaborators) -> Arc<Self> {
        let device_ids = DeviceIdAllocator::in_memory(config.first_device_id);
        Self::with_device_ids(config, collaborators, device_ids)
    }

    /// First-time setup: creates base directory, saves config. Device ids are persisted there.
    pub fn create(
        base_path: &str,
        config: PairingConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>> {
        std::fs::create_dir_all(base_path)
            .context(format!("creating base directory {}", base_path))?;
        config::save_config(base_path, &config)?;
        let device_ids =
            DeviceIdAllocator::load(&config::device_ids_path(base_path), config.first_device_id)?;
        Ok(Self::with_device_ids(config, collaborators, device_ids))
    }

    /// Load manager from previously created base directory.
    pub fn load(base_path: &str, collaborators: Collaborators) -> Result<Arc<Self>> {
        let config = config::load_config(base_path)?;
        let device_ids =
            DeviceIdAllocator::load(&config::device_ids_path(base_path), config.first_device_id)?;
        Ok(Self::with_device_ids(config, collaborators, device_ids))
    }

    fn with_device_ids(
        config: PairingConfig,
        collaborators: Collaborators,
        device_ids: DeviceIdAllocator,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            radio: collaborators.radio,
            controller_factory: collaborators.controller_factory,
            events: collaborators.events,
            parser: collaborators.parser,
            controller: OnceCell::new(),
            router: Arc::new(router::SessionRouter::new()),
            device_ids,
            sessions: std::sync::Mutex::new(HashMap::new()),
            controller_lock: tokio::sync::Mutex::new(()),
            controller_closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Returns true if barcode parses as setup payload.
    pub fn check_barcode(&self, barcode: &str) -> bool {
        match self.parser.parse(barcode) {
            Ok(payload) => {
                log::debug!("barcode ok, discriminator {}", payload.discriminator_filter());
                true
            }
            Err(_) => false,
        }
    }

    /// Start pairing in background task. Results are reported only by events.
    pub fn pair_device(
        self: &Arc<Self>,
        barcode: &str,
        hub_info: HubInfo,
        session_id: &str,
    ) -> JoinHandle<()> {
        let this = self.clone();
        let barcode = barcode.to_owned();
        let session_id = session_id.to_owned();
        tokio::spawn(async move {
            _ = this.pair(&barcode, hub_info, &session_id).await;
        })
    }

    /// Run pairing session to its end. Emits the same events as [Self::pair_device]
    /// and additionally returns the result.
    pub async fn pair(
        &self,
        barcode: &str,
        hub_info: HubInfo,
        session_id: &str,
    ) -> Result<PairingOutcome> {
        log::debug!("pairing session id={}", session_id);
        let token = match self.begin_session(session_id) {
            Ok(token) => token,
            // live session owns events for this id
            Err(e) if is_duplicate(&e) => {
                log::warn!("session {} already in progress, request rejected", session_id);
                return Err(e);
            }
            Err(e) => {
                self.emit_failure(session_id, &e);
                return Err(e);
            }
        };
        let res = self.run(barcode, &hub_info, session_id, &token).await;
        self.end_session(session_id);
        match &res {
            Ok(outcome) => {
                log::debug!("session {} paired device {}", session_id, outcome.device_id);
                self.emit(EventKind::PairingSuccess, session_id);
            }
            Err(e) => self.emit_failure(session_id, e),
        }
        res
    }

    /// Cancel session in progress. Returns false if there is no such session.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.lock_sessions().get(session_id) {
            Some(token) => {
                log::debug!("cancel session {}", session_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of sessions in progress.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut out: Vec<String> = self.lock_sessions().keys().cloned().collect();
        out.sort();
        out
    }

    /// Cancel all sessions and close device controller.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.close_controller();
    }

    fn close_controller(&self) {
        if let Some(c) = self.controller.get() {
            if !self.controller_closed.swap(true, Ordering::SeqCst) {
                log::debug!("closing device controller");
                c.close();
            }
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn device_ids(&self) -> &DeviceIdAllocator {
        &self.device_ids
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_session(&self, session_id: &str) -> Result<CancellationToken> {
        if self.shutdown.is_cancelled() {
            return Err(PairingError::Cancelled.into());
        }
        let mut sessions = self.lock_sessions();
        if sessions.contains_key(session_id) {
            return Err(PairingError::DuplicateSession(session_id.to_owned()).into());
        }
        let token = self.shutdown.child_token();
        sessions.insert(session_id.to_owned(), token.clone());
        Ok(token)
    }

    fn end_session(&self, session_id: &str) {
        self.lock_sessions().remove(session_id);
    }

    fn emit(&self, kind: EventKind, session_id: &str) {
        log::debug!("Event: {}, id={}", kind.name(), session_id);
        self.events.emit(PairingEvent::new(kind, session_id));
    }

    fn emit_failure(&self, session_id: &str, err: &anyhow::Error) {
        let pe = PairingError::from_anyhow(err);
        log::warn!("session {} failed: {:#}", session_id, err);
        let kind = match pe {
            PairingError::DeviceNotFound(_) => EventKind::ScanFail,
            _ => EventKind::PairingFail,
        };
        log::debug!("Event: {}, id={}", kind.name(), session_id);
        self.events.emit(PairingEvent::failure(kind, session_id, &pe));
    }

    fn enter(&self, session_id: &str, state: PairingState) {
        log::debug!("session {} -> {:?}", session_id, state);
    }

    async fn controller(&self) -> Result<Arc<dyn DeviceController>> {
        let c = self
            .controller
            .get_or_try_init(|| async {
                let c = self
                    .controller_factory
                    .create()
                    .await
                    .context("creating device controller")?;
                c.set_completion_listener(self.router.clone());
                log::debug!("device controller created");
                Ok::<_, anyhow::Error>(c)
            })
            .await?
            .clone();
        // shutdown may have run while controller was being created
        if self.shutdown.is_cancelled() {
            self.close_controller();
            return Err(PairingError::Cancelled.into());
        }
        Ok(c)
    }

    async fn run(
        &self,
        barcode: &str,
        hub_info: &HubInfo,
        session_id: &str,
        token: &CancellationToken,
    ) -> Result<PairingOutcome> {
        self.enter(session_id, PairingState::ParsingBarcode);
        let payload = self.parser.parse(barcode)?;

        self.enter(session_id, PairingState::BuildingCredentials);
        let credentials = hub_info.to_credentials()?;

        self.enter(session_id, PairingState::ScanningDevice);
        self.emit(EventKind::StartScanning, session_id);
        let discriminator = payload.discriminator_filter();
        let device = match guarded(
            token,
            self.config.scan_timeout(),
            self.radio.scan_for_device(discriminator),
        )
        .await
        {
            Ok(Some(Some(device))) => device,
            Ok(_) => return Err(PairingError::DeviceNotFound(payload.discriminator).into()),
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => {
                log::warn!("scan for {} failed: {:#}", discriminator, e);
                return Err(PairingError::DeviceNotFound(payload.discriminator).into());
            }
        };
        log::debug!("found device {:?}", device);

        self.enter(session_id, PairingState::Connecting);
        self.emit(EventKind::StartConnecting, session_id);
        let transport = match guarded(
            token,
            self.config.connect_timeout(),
            self.radio.connect(&device),
        )
        .await
        {
            Ok(Some(transport)) => transport,
            Ok(None) => return Err(PairingError::Timeout("connecting").into()),
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => return Err(PairingError::ConnectFailed(format!("{:#}", e)).into()),
        };

        self.enter(session_id, PairingState::Pairing);
        self.emit(EventKind::StartPairing, session_id);
        let _serialized = match self.config.session_policy {
            SessionPolicy::Serialized => Some(tokio::select! {
                _ = token.cancelled() => return Err(PairingError::Cancelled.into()),
                guard = self.controller_lock.lock() => guard,
            }),
            SessionPolicy::Concurrent => None,
        };
        let controller = self.controller().await?;
        let device_id = self.device_ids.allocate()?;
        // registered before pair_device, controller may answer before it returns
        let receiver = self.router.register(device_id, session_id)?;
        let res = self
            .commission(
                controller.as_ref(),
                &transport,
                device_id,
                payload.passcode,
                credentials,
                receiver,
                session_id,
                token,
            )
            .await;
        self.router.unregister(device_id);
        res?;
        Ok(PairingOutcome {
            session_id: session_id.to_owned(),
            device_id,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn commission(
        &self,
        controller: &dyn DeviceController,
        transport: &TransportHandle,
        device_id: u64,
        setup_pin_code: u32,
        credentials: NetworkCredentials,
        receiver: oneshot::Receiver<router::CommissioningResult>,
        session_id: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        controller
            .pair_device(
                transport,
                transport.connection_id,
                device_id,
                setup_pin_code,
                credentials,
            )
            .await?;
        self.enter(session_id, PairingState::AwaitingCommissioning);
        let completion = async {
            match receiver.await {
                Ok(r) => r.map_err(anyhow::Error::from),
                Err(_) => Err(anyhow::anyhow!("completion listener dropped")),
            }
        };
        match guarded(token, self.config.commissioning_timeout(), completion).await? {
            Some(()) => Ok(()),
            None => Err(PairingError::Timeout("commissioning").into()),
        }
    }
}

/// Await future unless session is cancelled. Ok(None) on timeout.
async fn guarded<T>(
    token: &CancellationToken,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<Option<T>> {
    tokio::select! {
        _ = token.cancelled() => Err(PairingError::Cancelled.into()),
        r = tokio::time::timeout(timeout, fut) => match r {
            Ok(v) => v.map(Some),
            Err(_) => Ok(None),
        },
    }
}

fn is_cancelled(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<PairingError>(), Some(PairingError::Cancelled))
}

fn is_duplicate(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<PairingError>(), Some(PairingError::DuplicateSession(_)))
}
