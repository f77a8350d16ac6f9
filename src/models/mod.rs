pub mod config;
pub mod firewall;

pub use config::*;
pub use firewall::*;
