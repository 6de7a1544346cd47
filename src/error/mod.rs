//! Error taxonomy for the resolution pipeline.
//!
//! Every component reports failures through one enum, [`ResolveError`], so
//! the classification that drives retry policy lives in a single place:
//!
//! | Variant            | Origin                       | Retried internally? |
//! |--------------------|------------------------------|---------------------|
//! | `InvalidReference` | normalizer (client-side)     | never               |
//! | `RateLimited`      | admission control            | never               |
//! | `NotFound`         | upstream explicit no-match   | never               |
//! | `Timeout`          | upstream exceeded deadline   | up to the bound     |
//! | `Upstream`         | upstream transport/5xx       | up to the bound     |
//!
//! The enum is `Clone` because a single in-flight upstream failure is fanned
//! out verbatim to every coalesced waiter.

use std::time::Duration;

use thiserror::Error;

/// Classified failure of a reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The raw input could not be normalized into a lookup key.
    #[error("invalid reference {raw:?}: {reason}")]
    InvalidReference {
        /// The offending user input, verbatim.
        raw: String,
        /// What the normalizer objected to.
        reason: String,
    },

    /// Admission was denied by the sliding-window rate limiter.
    #[error("rate limit exceeded for client {client_id:?}")]
    RateLimited { client_id: String },

    /// The upstream lookup service explicitly reported no such reference.
    #[error("reference {reference:?} not found upstream")]
    NotFound { reference: String },

    /// The upstream call did not complete within the configured deadline.
    #[error("lookup timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Transport failure or 5xx from the upstream lookup service.
    #[error("upstream lookup failed: {message}")]
    Upstream { message: String },
}

impl ResolveError {
    /// Short message suitable for a user-facing toast notification.
    ///
    /// The navigator reports failures through this channel only; internal
    /// detail stays in the [`std::fmt::Display`] form and the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidReference { .. } => "Invalid property reference",
            Self::RateLimited { .. } => "Too many requests, please wait a moment",
            Self::NotFound { .. } => "Property not available",
            Self::Timeout { .. } | Self::Upstream { .. } => {
                "Property lookup failed, please try again"
            }
        }
    }

    /// Whether the resolver may retry after this failure.
    ///
    /// Only transient upstream outcomes qualify; everything client-side or
    /// explicitly terminal is surfaced on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Upstream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(
            ResolveError::Timeout {
                timeout: Duration::from_secs(5)
            }
            .is_retryable()
        );
        assert!(
            ResolveError::Upstream {
                message: "502".into()
            }
            .is_retryable()
        );
        assert!(
            !ResolveError::NotFound {
                reference: "086983".into()
            }
            .is_retryable()
        );
        assert!(
            !ResolveError::RateLimited {
                client_id: "anonymous".into()
            }
            .is_retryable()
        );
        assert!(
            !ResolveError::InvalidReference {
                raw: "##".into(),
                reason: "empty".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn not_found_user_message() {
        let err = ResolveError::NotFound {
            reference: "999999".into(),
        };
        assert_eq!(err.user_message(), "Property not available");
    }
}
