//! Device controller - the external commissioning stack which performs
//! PASE, attestation, credential provisioning and CASE with the device.
//!
//! Controller reports progress through single [CompletionListener].
//! [crate::pairing::PairingManager] installs one listener which routes callbacks
//! to pending sessions by node id.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{credentials::NetworkCredentials, transport::TransportHandle};

/// Error code reported by controller for successful commissioning.
pub const STATUS_PAIRING_SUCCESS: u32 = 0;

pub trait CompletionListener: Send + Sync {
    /// Terminal callback of commissioning of node_id.
    fn on_commissioning_complete(&self, node_id: u64, error_code: u32);

    fn on_connect_device_complete(&self) {}

    fn on_status_update(&self, _status: u32) {}

    fn on_pairing_complete(&self, _code: u32) {}

    fn on_close_ble_complete(&self) {}

    /// Error not bound to commissioning result. When node_id is known the
    /// commissioning of that node is considered failed.
    fn on_error(&self, _node_id: Option<u64>, _error: &anyhow::Error) {}
}

#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Start commissioning. Returns once commissioning is started,
    /// result is delivered by [CompletionListener::on_commissioning_complete].
    async fn pair_device(
        &self,
        transport: &TransportHandle,
        connection_id: u32,
        device_id: u64,
        setup_pin_code: u32,
        credentials: NetworkCredentials,
    ) -> Result<()>;

    /// Replace listener. Only one listener is active.
    fn set_completion_listener(&self, listener: Arc<dyn CompletionListener>);

    fn close(&self);
}

/// Creates the process wide controller on first use.
#[async_trait]
pub trait ControllerFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn DeviceController>>;
}
