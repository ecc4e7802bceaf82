pub mod config;
pub mod decode;
pub mod dns;
pub mod error;
pub mod fetch;
pub mod output;
pub mod record;
pub mod resolver;
pub mod signature;
pub mod trust;
pub mod validation;

pub use config::Config;
pub use error::{AkdError, ConfigError, DnsError};
pub use resolver::{KeyResolver, KeySource, ResolvedKeys};
pub use trust::TrustOutcome;
