//! Plugin code vetting for Warden.
//!
//! - [`SecurityValidator`] runs a dangerous-pattern scan, an advisory
//!   suspicious-pattern scan and structural checks (size, exports, filename,
//!   obfuscation) over plugin source text, producing a [`SecurityReport`].
//! - [`PluginSigner`] signs and verifies plugin sources with HMAC-SHA256 so
//!   provenance can be checked without re-running the scan.
//! - [`SecurityValidator::is_url_trusted`] gates outbound URLs by scheme and
//!   deployment [`Environment`].
//!
//! A report with `safe == false` must block the code from being trusted.
//! Warnings never block.

mod error;
mod obfuscation;
mod patterns;
mod report;
mod signing;
mod validator;

pub use error::{SecurityError, SecurityResult};
pub use report::SecurityReport;
pub use signing::{PluginSignature, PluginSigner};
pub use validator::{Environment, SecurityValidator, ValidatorConfig};
