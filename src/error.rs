//! Failures a pairing session can end with.
//!
//! Internally everything is propagated as [anyhow::Error]; the orchestrator downcasts
//! to [PairingError] when it has to pick the terminal event for a session.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    #[error("barcode is not a recognized setup payload")]
    UnrecognizedBarcode,
    #[error("malformed network credentials: {0}")]
    MalformedCredentials(String),
    #[error("device with discriminator {0} not found")]
    DeviceNotFound(u16),
    #[error("connect to device failed: {0}")]
    ConnectFailed(String),
    #[error("commissioning failed with code {0}")]
    CommissioningFailed(u32),
    #[error("timeout while {0}")]
    Timeout(&'static str),
    #[error("pairing cancelled")]
    Cancelled,
    #[error("session {0} already in progress")]
    DuplicateSession(String),
}

impl PairingError {
    /// Short name reported to the host as `reason` of the failure event.
    pub fn reason(&self) -> &'static str {
        match self {
            PairingError::UnrecognizedBarcode => "UnrecognizedBarcode",
            PairingError::MalformedCredentials(_) => "MalformedCredentials",
            PairingError::DeviceNotFound(_) => "DeviceNotFound",
            PairingError::ConnectFailed(_) => "ConnectFailed",
            PairingError::CommissioningFailed(_) => "CommissioningFailed",
            PairingError::Timeout(_) => "Timeout",
            PairingError::Cancelled => "Cancelled",
            PairingError::DuplicateSession(_) => "DuplicateSession",
        }
    }

    /// Map arbitrary error to pairing error. Errors which are not [PairingError]
    /// are reported by controller/transport implementations and count as commissioning failure.
    pub fn from_anyhow(err: &anyhow::Error) -> PairingError {
        match err.downcast_ref::<PairingError>() {
            Some(e) => e.clone(),
            None => PairingError::CommissioningFailed(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::PairingError;

    #[test]
    fn test_downcast_through_context() {
        let r: anyhow::Result<()> = Err(PairingError::DeviceNotFound(3840).into());
        let e = r.context("scanning").unwrap_err();
        assert_eq!(PairingError::from_anyhow(&e), PairingError::DeviceNotFound(3840));
        assert_eq!(PairingError::from_anyhow(&e).reason(), "DeviceNotFound");
    }

    #[test]
    fn test_foreign_error() {
        let e = anyhow::anyhow!("radio exploded");
        assert_eq!(
            PairingError::from_anyhow(&e),
            PairingError::CommissioningFailed(u32::MAX)
        );
    }
}
