//! Matter device pairing over short range radio
//!
//! This library drives pairing of Matter device found over BLE and provisions it with network credentials.
//! Library uses asynchronous Rust and depends on Tokio.
//! Following are main parts of api:
//! - [PairingManager](pairing::PairingManager) - Validates barcode, scans for device, connects to it and hands it over
//!                             to device controller. Progress is reported as events carrying caller supplied request id.
//! - [RadioTransport](transport::RadioTransport) - Trait allowing to supply platform radio (scan + connect).
//! - [DeviceController](controller::DeviceController) - Trait for external commissioning stack. Its callbacks are routed
//!                             back to pairing sessions by node id, so multiple sessions may be in flight.
//! - [dataset](dataset) - Thread operational dataset encoder (MeshCoP tlv).
//! - [onboarding](onboarding) - QR code and manual pairing code decoding.
//! - [simulated](simulated) - in-process radio and controller, useful for tests and host integration.
//!
//! Example how to check barcode and encode thread dataset:
//! ```
//! # use anyhow::Result;
//! # use matpair::{dataset, onboarding};
//! # fn main() -> Result<()> {
//! assert!(onboarding::check_barcode("MT:Y.K9042C00KA0648G00"));
//! assert!(!onboarding::check_barcode("hello"));
//! let ds = dataset::OperationalDataset::from_hex(15, 0xffff,
//!                                                Some("1122334455667788"),
//!                                                Some("00112233445566778899aabbccddeeff"))?;
//! let bytes = ds.encode()?;
//! assert_eq!(&bytes[..5], &[0, 3, 0, 0, 15]);
//! # Ok(())
//! # }
//! ```
//!
//! Example pairing device with simulated radio and controller:
//! ```
//! # use std::sync::Arc;
//! # use anyhow::Result;
//! # use matpair::{credentials::HubInfo, events::ChannelSink, pairing, simulated};
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let (sink, _events) = ChannelSink::new();
//! let radio = Arc::new(simulated::SimulatedRadio::new().with_device(3840, "AA:01"));
//! let controller = Arc::new(simulated::SimulatedController::new());
//! let factory = Arc::new(simulated::SimulatedControllerFactory::new(controller));
//! let pm = pairing::PairingManager::new(pairing::PairingConfig::default(),
//!                                       pairing::Collaborators::new(radio, factory, sink));
//! let outcome = pm.pair("MT:Y.K9042C00KA0648G00", HubInfo::wifi("home", "secret"), "req-1").await?;
//! assert_eq!(outcome.device_id, 1);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod credentials;
pub mod dataset;
pub mod error;
pub mod events;
pub mod onboarding;
pub mod pairing;
pub mod simulated;
pub mod tlv;
pub mod transport;
