use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::Result;
use tokio::sync::oneshot;

use crate::{
    controller::{CompletionListener, STATUS_PAIRING_SUCCESS},
    error::PairingError,
};

pub(crate) type CommissioningResult = std::result::Result<(), PairingError>;

struct PendingSession {
    session_id: String,
    sender: oneshot::Sender<CommissioningResult>,
}

/// Listener installed on shared controller. Routes terminal callbacks to waiting session by node id.
pub(crate) struct SessionRouter {
    pending: Mutex<HashMap<u64, PendingSession>>,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingSession>> {
        // map stays consistent even if holder panicked
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register session waiting for commissioning result of node_id.
    pub fn register(
        &self,
        node_id: u64,
        session_id: &str,
    ) -> Result<oneshot::Receiver<CommissioningResult>> {
        let mut pending = self.lock();
        if let Some(existing) = pending.get(&node_id) {
            anyhow::bail!(
                "node {} already pending for session {}",
                node_id,
                existing.session_id
            );
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(
            node_id,
            PendingSession {
                session_id: session_id.to_owned(),
                sender,
            },
        );
        Ok(receiver)
    }

    pub fn unregister(&self, node_id: u64) {
        self.lock().remove(&node_id);
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn complete(&self, node_id: u64, result: CommissioningResult) {
        let Some(p) = self.lock().remove(&node_id) else {
            log::warn!("commissioning result for unknown node {} dropped", node_id);
            return;
        };
        log::debug!(
            "commissioning of node {} for session {} finished: {:?}",
            node_id,
            p.session_id,
            result
        );
        // session may have already timed out
        _ = p.sender.send(result);
    }
}

impl CompletionListener for SessionRouter {
    fn on_commissioning_complete(&self, node_id: u64, error_code: u32) {
        if error_code == STATUS_PAIRING_SUCCESS {
            self.complete(node_id, Ok(()));
        } else {
            self.complete(node_id, Err(PairingError::CommissioningFailed(error_code)));
        }
    }

    fn on_connect_device_complete(&self) {
        log::debug!("onConnectDeviceComplete");
    }

    fn on_status_update(&self, status: u32) {
        log::debug!("pairing status update: {}", status);
    }

    fn on_pairing_complete(&self, code: u32) {
        log::debug!("onPairingComplete: {}", code);
    }

    fn on_close_ble_complete(&self) {
        log::debug!("onCloseBleComplete");
    }

    fn on_error(&self, node_id: Option<u64>, error: &anyhow::Error) {
        log::warn!("controller error (node {:?}): {:#}", node_id, error);
        if let Some(node_id) = node_id {
            self.complete(node_id, Err(PairingError::CommissioningFailed(u32::MAX)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionRouter;
    use crate::{controller::CompletionListener, error::PairingError};

    #[tokio::test]
    async fn routes_by_node_id() {
        let r = SessionRouter::new();
        let a = r.register(1, "a").unwrap();
        let b = r.register(2, "b").unwrap();
        assert!(r.register(1, "c").is_err());
        r.on_commissioning_complete(2, 7);
        r.on_commissioning_complete(1, 0);
        assert_eq!(a.await.unwrap(), Ok(()));
        assert_eq!(b.await.unwrap(), Err(PairingError::CommissioningFailed(7)));
        assert_eq!(r.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_and_late_callbacks_ignored() {
        let r = SessionRouter::new();
        r.on_commissioning_complete(42, 0);
        let a = r.register(1, "a").unwrap();
        drop(a);
        r.on_commissioning_complete(1, 0);
        let b = r.register(1, "b").unwrap();
        r.unregister(1);
        assert!(b.await.is_err());
    }

    #[tokio::test]
    async fn error_with_node_fails_session() {
        let r = SessionRouter::new();
        let a = r.register(3, "a").unwrap();
        r.on_error(None, &anyhow::anyhow!("ignored"));
        assert_eq!(r.pending_count(), 1);
        r.on_error(Some(3), &anyhow::anyhow!("ble dropped"));
        assert!(matches!(a.await.unwrap(), Err(PairingError::CommissioningFailed(_))));
    }
}
