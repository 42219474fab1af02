//! blinkd: blinks the keyboard LEDs of the Linux console on request from the network.

pub mod cancel;
pub mod client;
pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod led;
pub mod listener;
pub mod protocol;
pub mod rates;
pub mod session;
pub mod shutdown;
pub mod worker;

pub use error::BlinkdError;
