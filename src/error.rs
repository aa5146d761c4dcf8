//! Error types for quota aggregation.
//!
//! The taxonomy follows how far a failure is allowed to travel:
//! - [`ProviderError`]: a single collaborator call failed. Never leaves the
//!   component that made the call except as the `source` of a larger error.
//! - [`FetchError`]: a whole region fetch failed. The aggregation engine turns
//!   these into warning strings; they never fail an aggregate call.
//! - [`QueryError`]: the only errors the query service surfaces to its caller.

use std::io;

/// A remote collaborator call failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider API answered with an error.
    #[error("{operation} failed: {message}")]
    Api {
        /// Name of the remote operation, e.g. `ListServices`.
        operation: String,
        /// Provider-supplied message.
        message: String,
    },
    /// The provider throttled the request.
    #[error("{operation} throttled by provider")]
    Throttled {
        /// Name of the remote operation.
        operation: String,
    },
    /// Credentials or region configuration could not be resolved.
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl ProviderError {
    /// Convenience constructor for [`ProviderError::Api`].
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Api { operation: operation.into(), message: message.into() }
    }
}

/// A region fetch (or one of its rate-limited listings) failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FetchError {
    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
    /// Region clients could not be constructed.
    #[error("cannot resolve configuration for region {region}: {source}")]
    Connect {
        /// Region code.
        region: String,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// The region's service listing failed.
    #[error("cannot list services in region {region}: {source}")]
    ListServices {
        /// Region code.
        region: String,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// Quota listing for one service failed. Only that service is skipped.
    #[error("cannot list quotas for service {service} in region {region}: {source}")]
    ListQuotas {
        /// Region code.
        region: String,
        /// Service code.
        service: String,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// The rate limiter failed or can never grant a token. Ordinary denials wait.
    #[error("rate limiter unavailable: {0}")]
    RateLimit(String),
}

impl FetchError {
    /// Check if this error is due to cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors surfaced by the cache-fronted query service.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum QueryError {
    /// The request could not be interpreted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Enabled regions could not be enumerated.
    #[error("cannot list regions: {0}")]
    ListRegions(#[source] ProviderError),
    /// A service listing requested directly by the caller failed.
    #[error(transparent)]
    ListServices(#[from] FetchError),
    /// The caller cancelled before anything could be returned.
    #[error("operation cancelled")]
    Cancelled,
    /// Nothing has been fetched for this key yet.
    #[error("no data available for {key}; fetch quotas first")]
    NoData {
        /// Cache key that was looked up.
        key: String,
    },
}

impl QueryError {
    /// Check if this error means the cache was never populated for the request.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

/// Configuration loading or validation failed.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid YAML for [`crate::config::Config`].
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
