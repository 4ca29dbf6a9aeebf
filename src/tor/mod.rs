//! Tor daemon interaction
//!
//! Control port protocol, onion service handles, connectivity probing and
//! the detection state machine deciding which Tor to use.

pub mod connectivity;
pub mod control;
pub mod executable;
pub mod instance;
pub mod onion;
pub mod version;

pub use connectivity::{Connectivity, TorCheck};
pub use control::{AuthMethod, ControlPortClient};
pub use instance::{Instance, InstanceState};
pub use onion::{is_valid_onion_address, HiddenService, KeyType};
pub use version::version_compatible;
