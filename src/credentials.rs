//! Network credentials provisioned to device during pairing.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::dataset::OperationalDataset;

/// Credentials passed to device controller. Exactly one network type per pairing attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum NetworkCredentials {
    WiFi { ssid: String, password: String },
    Thread { operational_dataset: Vec<u8> },
}

// secrets stay out of logs
impl std::fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkCredentials::WiFi { ssid, .. } => {
                f.debug_struct("WiFi").field("ssid", ssid).finish_non_exhaustive()
            }
            NetworkCredentials::Thread { operational_dataset } => f
                .debug_struct("Thread")
                .field("dataset_len", &operational_dataset.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Network information supplied by host application, in the shape the host sends it:
/// ```json
/// {"channel": 15, "panId": 65535, "xpanId": "1122334455667788", "masterKey": "0011..."}
/// {"ssid": "home", "password": "secret"}
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HubInfo {
    #[serde(rename_all = "camelCase")]
    Thread {
        channel: u16,
        pan_id: u16,
        #[serde(default)]
        xpan_id: Option<String>,
        #[serde(default)]
        master_key: Option<String>,
    },
    WiFi { ssid: String, password: String },
}

impl std::fmt::Debug for HubInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubInfo::Thread { channel, pan_id, .. } => f
                .debug_struct("Thread")
                .field("channel", channel)
                .field("pan_id", pan_id)
                .finish_non_exhaustive(),
            HubInfo::WiFi { ssid, .. } => {
                f.debug_struct("WiFi").field("ssid", ssid).finish_non_exhaustive()
            }
        }
    }
}

impl HubInfo {
    pub fn thread(channel: u16, pan_id: u16, xpan_id: &str, master_key: &str) -> Self {
        HubInfo::Thread {
            channel,
            pan_id,
            xpan_id: Some(xpan_id.to_owned()),
            master_key: Some(master_key.to_owned()),
        }
    }

    pub fn wifi(ssid: &str, password: &str) -> Self {
        HubInfo::WiFi {
            ssid: ssid.to_owned(),
            password: password.to_owned(),
        }
    }

    /// Build credentials. For thread this encodes the operational dataset, so malformed
    /// extended pan id or master key fail here with [crate::error::PairingError::MalformedCredentials].
    pub fn to_credentials(&self) -> Result<NetworkCredentials> {
        match self {
            HubInfo::Thread {
                channel,
                pan_id,
                xpan_id,
                master_key,
            } => {
                let dataset = OperationalDataset::from_hex(
                    *channel,
                    *pan_id,
                    xpan_id.as_deref(),
                    master_key.as_deref(),
                )?;
                Ok(NetworkCredentials::Thread {
                    operational_dataset: dataset.encode()?,
                })
            }
            HubInfo::WiFi { ssid, password } => Ok(NetworkCredentials::WiFi {
                ssid: ssid.clone(),
                password: password.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HubInfo, NetworkCredentials};
    use crate::{dataset::OperationalDataset, error::PairingError};

    #[test]
    fn test_hub_info_from_host_json() {
        let hub: HubInfo = serde_json::from_str(
            r#"{"channel": 15, "panId": 65535, "xpanId": "1122334455667788",
                "masterKey": "00112233445566778899aabbccddeeff"}"#,
        )
        .unwrap();
        let creds = hub.to_credentials().unwrap();
        let NetworkCredentials::Thread { operational_dataset } = creds else {
            panic!("expected thread credentials");
        };
        let ds = OperationalDataset::decode(&operational_dataset).unwrap();
        assert_eq!(ds.channel, 15);
        assert_eq!(ds.pan_id, 0xffff);
    }

    #[test]
    fn test_missing_keys() {
        let hub: HubInfo = serde_json::from_str(r#"{"channel": 11, "panId": 1}"#).unwrap();
        let e = hub.to_credentials().unwrap_err();
        assert!(matches!(
            e.downcast_ref::<PairingError>(),
            Some(PairingError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn test_wifi() {
        let hub: HubInfo = serde_json::from_str(r#"{"ssid": "home", "password": "pw"}"#).unwrap();
        assert_eq!(
            hub.to_credentials().unwrap(),
            NetworkCredentials::WiFi {
                ssid: "home".to_owned(),
                password: "pw".to_owned()
            }
        );
        assert!(!format!("{:?}", hub).contains("pw"));
    }
}
