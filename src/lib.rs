//! # mqtts-node
//!
//! Firmware core for a wireless sensor node that keeps an MQTT session to a
//! broker alive, over TLS or plain TCP, and decodes the small JSON inventory
//! records it receives. `no_std`, heap-free, built on
//! [Embassy](https://embassy.dev/).
//!
//! ## Layers
//!
//! - [`wifi`]: keeps the station associated and reports link readiness.
//! - [`session`] and `tls`: dial the broker, secure the stream, reconnect on
//!   failure.
//! - [`client`], [`packet`], [`transport`]: an MQTT 3.1.1 client (QoS 0/1,
//!   keep-alive, credentials) over any async byte stream.
//! - [`runtime`]: drives application modules over a client session.
//! - [`inventory`] and [`payload`]: the node's own topic plan and JSON
//!   records.
//!
//! Board specifics (radio driver, network stack allocation, crypto provider)
//! are supplied through traits, so everything above runs on the host in tests.
//!
//! ## Wiring
//!
//! ```ignore
//! static LINK: LinkState = LinkState::new();
//! static PUBLISH_CHANNEL: PublishRequestChannel<'static, 4> = Channel::new();
//!
//! #[embassy_executor::task]
//! async fn wifi_task(mut radio: BoardRadio, stack: Stack<'static>) {
//!     Station::new(config::WIFI).run(&mut radio, &stack, &LINK).await
//! }
//!
//! #[embassy_executor::task]
//! async fn mqtt_task(stack: Stack<'static>, mut channel: BoardTlsChannel) {
//!     let mut module = InventoryModule::from_config(&config::APP);
//!     run_session(
//!         stack,
//!         &LINK,
//!         &config::BROKER.with_trust_anchor(include_bytes!("../certs/ca.der")),
//!         &mut channel,
//!         &mut module,
//!         PUBLISH_CHANNEL.receiver(),
//!     )
//!     .await
//! }
//! ```
//!
//! ## Logging
//!
//! Enable one of the `defmt`, `log` or `esp32-log` features to choose a
//! backend. With none enabled, logging compiles away.

#![no_std]

#[cfg(test)]
extern crate std;

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod client;
pub mod config;
pub mod error;
pub mod inventory;
pub mod packet;
pub mod payload;
pub mod runtime;
pub mod session;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transport;
pub mod util;
pub mod wifi;

#[cfg(test)]
mod testing;

pub use client::{MqttClient, MqttEvent, MqttOptions};
pub use error::MqttError;
pub use inventory::InventoryModule;
pub use packet::QoS;
pub use session::{PlainChannel, SecureChannel, SessionError, run_session};
#[cfg(feature = "tls")]
pub use tls::TlsChannel;
pub use transport::TcpTransport;
pub use wifi::{LinkState, Station};
