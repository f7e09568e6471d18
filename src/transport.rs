//! Short range radio transport (BLE) used to reach uncommissioned device.
//! Implementation is supplied by the platform; see [crate::simulated] for in-process one.

use anyhow::Result;
use async_trait::async_trait;

use crate::onboarding::Discriminator;

/// Device found by scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub address: String,
    pub discriminator: u16,
    pub name: Option<String>,
}

/// Connected transport, passed to device controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub address: String,
    pub connection_id: u32,
}

#[async_trait]
pub trait RadioTransport: Send + Sync {
    /// Scan for device advertising matching discriminator.
    /// Returns None when scan finished without finding it. Caller applies timeout.
    async fn scan_for_device(&self, discriminator: Discriminator) -> Result<Option<DeviceHandle>>;

    async fn connect(&self, device: &DeviceHandle) -> Result<TransportHandle>;
}
