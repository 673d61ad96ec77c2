// A SIP dialog layer in Rust
pub type Result<T> = std::result::Result<T, crate::error::Error>;
pub use crate::error::Error;
pub mod config;
pub mod dialog;
pub mod error;
pub mod sdp;
pub mod timer;
pub mod transport;
pub use config::CallConfig;
