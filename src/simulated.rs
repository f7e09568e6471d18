//! In-process radio and device controller.
//!
//! Simulated devices advertise a discriminator, accept connections and answer
//! commissioning with configured result after configured delay. Useful for tests
//! and for trying out host integration without hardware.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{
    controller::{CompletionListener, ControllerFactory, DeviceController},
    credentials::NetworkCredentials,
    onboarding::Discriminator,
    transport::{DeviceHandle, RadioTransport, TransportHandle},
};

#[derive(Debug, Clone)]
struct SimulatedDevice {
    handle: DeviceHandle,
    connect_error: Option<String>,
}

pub struct SimulatedRadio {
    devices: Vec<SimulatedDevice>,
    scan_delay: Duration,
    connection_counter: AtomicU32,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            scan_delay: Duration::from_millis(10),
            connection_counter: AtomicU32::new(1),
        }
    }

    pub fn with_device(mut self, discriminator: u16, address: &str) -> Self {
        self.devices.push(SimulatedDevice {
            handle: DeviceHandle {
                address: address.to_owned(),
                discriminator,
                name: Some(format!("MATTER-{}", discriminator)),
            },
            connect_error: None,
        });
        self
    }

    /// Device which is found by scan but refuses connection.
    pub fn with_unreachable_device(mut self, discriminator: u16, address: &str, error: &str) -> Self {
        self = self.with_device(discriminator, address);
        if let Some(d) = self.devices.last_mut() {
            d.connect_error = Some(error.to_owned());
        }
        self
    }

    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioTransport for SimulatedRadio {
    async fn scan_for_device(&self, discriminator: Discriminator) -> Result<Option<DeviceHandle>> {
        tokio::time::sleep(self.scan_delay).await;
        Ok(self
            .devices
            .iter()
            .find(|d| discriminator.matches(d.handle.discriminator))
            .map(|d| d.handle.clone()))
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<TransportHandle> {
        let d = self
            .devices
            .iter()
            .find(|d| d.handle.address == device.address)
            .context(format!("device {} is gone", device.address))?;
        if let Some(e) = &d.connect_error {
            anyhow::bail!("connect to {} failed: {}", device.address, e);
        }
        Ok(TransportHandle {
            address: device.address.clone(),
            connection_id: self.connection_counter.fetch_add(1, Ordering::Relaxed),
        })
    }
}

/// How simulated device answers commissioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    /// None - controller never calls back
    pub error_code: Option<u32>,
    pub delay: Duration,
}

impl Behavior {
    pub fn complete(error_code: u32, delay: Duration) -> Self {
        Self {
            error_code: Some(error_code),
            delay,
        }
    }
    pub fn silent() -> Self {
        Self {
            error_code: None,
            delay: Duration::ZERO,
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self::complete(0, Duration::from_millis(10))
    }
}

/// Record of pair_device call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRequest {
    pub address: String,
    pub connection_id: u32,
    pub device_id: u64,
    pub setup_pin_code: u32,
    pub credentials: NetworkCredentials,
}

/// Controller answering by transport address.
pub struct SimulatedController {
    behaviors: HashMap<String, Behavior>,
    listener: Mutex<Option<Arc<dyn CompletionListener>>>,
    requests: Mutex<Vec<PairRequest>>,
    closed: AtomicBool,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            listener: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_behavior(mut self, address: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(address.to_owned(), behavior);
        self
    }

    pub fn requests(&self) -> Vec<PairRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceController for SimulatedController {
    async fn pair_device(
        &self,
        transport: &TransportHandle,
        connection_id: u32,
        device_id: u64,
        setup_pin_code: u32,
        credentials: NetworkCredentials,
    ) -> Result<()> {
        if self.is_closed() {
            anyhow::bail!("controller is closed");
        }
        let listener = self
            .listener
            .lock()
            .map_err(|e| anyhow::anyhow!("listener lock: {}", e))?
            .clone()
            .context("completion listener not set")?;
        self.requests
            .lock()
            .map_err(|e| anyhow::anyhow!("requests lock: {}", e))?
            .push(PairRequest {
                address: transport.address.clone(),
                connection_id,
                device_id,
                setup_pin_code,
                credentials,
            });
        let behavior = self
            .behaviors
            .get(&transport.address)
            .copied()
            .unwrap_or_default();
        log::debug!(
            "simulated commissioning of {} as node {}: {:?}",
            transport.address,
            device_id,
            behavior
        );
        if let Some(code) = behavior.error_code {
            tokio::spawn(async move {
                tokio::time::sleep(behavior.delay).await;
                listener.on_pairing_complete(0);
                listener.on_commissioning_complete(device_id, code);
            });
        }
        Ok(())
    }

    fn set_completion_listener(&self, listener: Arc<dyn CompletionListener>) {
        if let Ok(mut l) = self.listener.lock() {
            *l = Some(listener);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out one shared [SimulatedController] and counting creations.
pub struct SimulatedControllerFactory {
    controller: Arc<SimulatedController>,
    created: AtomicUsize,
    create_delay: Duration,
}

impl SimulatedControllerFactory {
    pub fn new(controller: Arc<SimulatedController>) -> Self {
        Self {
            controller,
            created: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
        }
    }

    /// Controller start-up takes this long.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerFactory for SimulatedControllerFactory {
    async fn create(&self) -> Result<Arc<dyn DeviceController>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        Ok(self.controller.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::Discriminator;

    #[tokio::test]
    async fn scan_and_connect() {
        let radio = SimulatedRadio::new()
            .with_device(3840, "AA:01")
            .with_unreachable_device(1234, "AA:02", "gatt error 133");
        let d = radio
            .scan_for_device(Discriminator { value: 3840, short: false })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.address, "AA:01");
        let short = radio
            .scan_for_device(Discriminator { value: 0xf00, short: true })
            .await
            .unwrap();
        assert_eq!(short, Some(d.clone()));
        assert!(radio
            .scan_for_device(Discriminator { value: 1, short: false })
            .await
            .unwrap()
            .is_none());

        let t1 = radio.connect(&d).await.unwrap();
        let t2 = radio.connect(&d).await.unwrap();
        assert_ne!(t1.connection_id, t2.connection_id);

        let d2 = radio
            .scan_for_device(Discriminator { value: 1234, short: false })
            .await
            .unwrap()
            .unwrap();
        assert!(radio.connect(&d2).await.is_err());
    }

    #[tokio::test]
    async fn pair_without_listener_fails() {
        let c = SimulatedController::new();
        let t = TransportHandle {
            address: "AA:01".to_owned(),
            connection_id: 1,
        };
        let creds = NetworkCredentials::WiFi {
            ssid: "s".to_owned(),
            password: "p".to_owned(),
        };
        assert!(c.pair_device(&t, 1, 1, 20202021, creds.clone()).await.is_err());
        assert!(c.requests().is_empty());
        c.close();
        assert!(c.pair_device(&t, 1, 1, 20202021, creds).await.is_err());
    }
}
