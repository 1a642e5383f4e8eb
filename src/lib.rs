//! Rust client library for the Axia Livewire Routing Protocol (LWRP)
//!
//! LWRP is a line-oriented, key=value text protocol spoken over a
//! long-lived TCP connection (port 93) to Livewire audio-routing hardware.
//! This library provides an async client for it. It supports:
//!
//! - Command/reply correlation over a single shared socket, concurrent
//!   with unsolicited state-change notifications from the device
//! - An in-memory mirror of device state with consistent snapshots
//! - Per-topic notification subscriptions with callback isolation
//! - Typed access to device, network, source, destination, GPIO, meter,
//!   and level-alert data
//!
//! # Quick Start
//!
//! ```no_run
//! use lwrp_client::{LwrpClient, PinLevel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LwrpClient::connect("192.168.1.50").await?;
//!     client.login(Some("secret")).await?;
//!
//!     let device = client.device_data().await?;
//!     println!("connected to {:?}", device.device_name);
//!
//!     // Route source channel 1 and pull a GPO pin low
//!     client.set_source(1, "239.192.0.1").await?;
//!     client.set_gpo(2, 3, PinLevel::Low).await?;
//!
//!     // Watch GPIO changes as they happen
//!     client.enable_gpio_updates().await?;
//!     let handle = client.on_gpio(|gpio| {
//!         println!("GPIO channel {} changed: {:?}", gpio.channel, gpio.pins);
//!     });
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     client.unsubscribe(&handle);
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Raw commands
//!
//! Anything the typed client does not cover can be sent through the
//! session directly:
//!
//! ```no_run
//! use lwrp_client::{Command, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::connect("192.168.1.50").await?;
//!     let reply = session.issue(Command::new("VER")).await?;
//!     println!("{:?}", reply.fields);
//!     session.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: typed convenience API over a session
//! - **Session**: connect/login lifecycle, command issue, subscriptions,
//!   state snapshots
//! - **Connection**: socket ownership, the read loop, and reply
//!   correlation
//! - **Protocol**: wire framing (frames, commands, topics)
//! - **Cache**: latest-record-per-category device state mirror
//! - **Dispatch**: per-topic callback registry
//! - **Types**: typed records parsed from frames

mod cache;
mod client;
mod connection;
mod correlator;
mod dispatch;
mod error;
mod protocol;
mod session;
mod types;

// Public exports
pub use cache::{Category, StateCache};
pub use client::LwrpClient;
pub use dispatch::{Callback, Dispatcher, SubscriptionHandle};
pub use error::{LwrpError, Result};
pub use protocol::{verb, Command, Frame, FrameAssembler, Topic, LWRP_PORT};
pub use session::{Session, SessionConfig, SessionState};
pub use types::{
    pin_mask, DestinationConfig, DeviceInfo, GpioState, IoDirection, LevelAlert, MeterReading,
    NetworkInfo, PinLevel, PinState, Side, SourceConfig, StereoLevel, GPIO_PINS_PER_CHANNEL,
};
