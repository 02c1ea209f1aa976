//! Company logo resolution.
//!
//! Lookups go memo → in-flight → remote, and always end in a reference:
//! either the remote logo or a deterministic initials placeholder.

mod fallback;
mod key;
mod memo;
mod service;
mod types;

pub use fallback::{FallbackGenerator, GENERIC_LABEL};
pub use key::CompanyKey;
pub use memo::{Claim, PendingHandle, PendingResolution, ResolutionEntry, ResolutionMemoCache};
pub use service::LogoResolutionService;
pub use types::{FallbackLogo, LogoRef};
