//! Notification events reported to host application during pairing.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::PairingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartScanning,
    ScanFail,
    StartConnecting,
    StartPairing,
    PairingSuccess,
    PairingFail,
}

impl EventKind {
    /// Event name as seen by host application
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::StartScanning => "onStartScanning",
            EventKind::ScanFail => "onScanFail",
            EventKind::StartConnecting => "onStartConnecting",
            EventKind::StartPairing => "onStartPairing",
            EventKind::PairingSuccess => "onPairingSuccess",
            EventKind::PairingFail => "onPairingFail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::ScanFail | EventKind::PairingSuccess | EventKind::PairingFail
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingEvent {
    pub kind: EventKind,
    pub payload: EventPayload,
}

#[derive(Serialize)]
struct EventJson<'a> {
    event: &'static str,
    payload: &'a EventPayload,
}

impl PairingEvent {
    pub fn new(kind: EventKind, request_id: &str) -> Self {
        Self {
            kind,
            payload: EventPayload {
                request_id: request_id.to_owned(),
                reason: None,
            },
        }
    }

    pub fn failure(kind: EventKind, request_id: &str, error: &PairingError) -> Self {
        let mut e = Self::new(kind, request_id);
        if kind == EventKind::PairingFail {
            e.payload.reason = Some(error.reason().to_owned());
        }
        e
    }

    pub fn request_id(&self) -> &str {
        &self.payload.request_id
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// `{"event": "onStartScanning", "payload": {"requestId": "..."}}`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&EventJson {
            event: self.name(),
            payload: &self.payload,
        })?)
    }
}

/// Receiver of pairing events. Called from pairing task; implementation shall
/// hand event over to host's ui context without blocking.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PairingEvent);
}

/// Sink forwarding events to tokio channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<PairingEvent>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PairingEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PairingEvent) {
        if self.sender.send(event).is_err() {
            log::warn!("event receiver is gone, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelSink, EventKind, EventSink, PairingEvent};
    use crate::error::PairingError;

    #[test]
    fn test_json() {
        let e = PairingEvent::new(EventKind::StartScanning, "req-1");
        assert_eq!(
            e.to_json().unwrap(),
            r#"{"event":"onStartScanning","payload":{"requestId":"req-1"}}"#
        );
        let e = PairingEvent::failure(EventKind::PairingFail, "req-2", &PairingError::Cancelled);
        assert_eq!(
            e.to_json().unwrap(),
            r#"{"event":"onPairingFail","payload":{"requestId":"req-2","reason":"Cancelled"}}"#
        );
        let e = PairingEvent::failure(EventKind::ScanFail, "req-3", &PairingError::DeviceNotFound(1));
        assert_eq!(e.payload.reason, None);
    }

    #[test]
    fn test_terminal() {
        assert!(EventKind::ScanFail.is_terminal());
        assert!(EventKind::PairingSuccess.is_terminal());
        assert!(!EventKind::StartPairing.is_terminal());
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(PairingEvent::new(EventKind::StartPairing, "a"));
        let e = rx.recv().await.unwrap();
        assert_eq!(e.name(), "onStartPairing");
        assert_eq!(e.request_id(), "a");
        drop(rx);
        // must not panic
        sink.emit(PairingEvent::new(EventKind::StartPairing, "a"));
    }
}
