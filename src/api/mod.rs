//! Remote tracker service: wire types, typed errors and the HTTP client.

mod client;
mod error;
mod remote;
mod wire;

pub use client::ApiClient;
pub use error::ApiError;
pub use remote::{JobsRemote, LogoProbe, LogoRemote};
