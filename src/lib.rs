mod config;
mod service;

pub use config::{CONFIG_FILE, SwapConfig};
pub use service::{Broadcast, ServiceError, SwapService};

pub use htlc_sdk::Network;
