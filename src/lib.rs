pub mod bridge;
pub mod config;
pub mod error;
pub mod lookup;
pub mod transport;

pub use bridge::{Bridge, CallOptions, RpcClient};
pub use config::{BridgeSettings, load_settings};
pub use error::{ConfigError, RpcError, RpcResult};
