//! Ties the PPP engine (`vpncore-ppp`) and the transport manager
//! (`vpncore-transport`) to a local virtual interface and the external
//! routing/DNS helper, completing the transport-engine core (spec.md §1).
//!
//! Grounded on the teacher's `vl1-service` crate, which plays the analogous
//! role of wiring a protocol core to OS-level I/O and an external process.

pub mod config;
pub mod driver;
pub mod error;
pub mod session;
pub mod stats;

pub use config::{Dialect, DatagramCryptoParams, Secret, Settings, SplitInclude, TunnelConfig};
pub use driver::{TunDevice, TunnelDriver};
pub use error::TunnelError;
pub use session::Session;
pub use stats::SessionStats;
