//! Module for relay target policy implementations.
use thiserror::Error;
use url::Url;

mod allowed_hosts;
mod public_network;

pub use allowed_hosts::*;
pub use public_network::*;

/// Represents a target policy error.
#[derive(Debug, Error)]
pub enum TargetPolicyError {
    /// The target URL has no host to check.
    #[error("target URL `{0}` has no host")]
    MissingHost(String),
    /// The host is not one of the allowed hosts.
    #[error("host `{0}` is not an allowed relay target")]
    HostNotAllowed(String),
    /// The host is a loopback, private or otherwise non-public address.
    #[error("host `{0}` is not a public network address")]
    NonPublicHost(String),
}

/// The result type returned by target policies.
pub type TargetPolicyResult<T> = Result<T, TargetPolicyError>;

/// A trait implemented by target policies.
///
/// Target policies are checked before the relay makes any network call.
pub trait TargetPolicy: Send + Sync {
    /// Checks the target URL against the policy.
    fn check(&self, url: &Url) -> TargetPolicyResult<()>;
}

/// Represents a collection of target policies.
///
/// Target policies are checked in order of their addition
/// to the collection.
#[derive(Default)]
pub struct TargetPolicyCollection {
    policies: Vec<Box<dyn TargetPolicy>>,
}

impl TargetPolicyCollection {
    /// Creates a new target policy collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new target policy into the collection.
    pub fn push(&mut self, policy: impl TargetPolicy + 'static) {
        self.policies.push(Box::new(policy));
    }

    /// Whether the collection has no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl TargetPolicy for TargetPolicyCollection {
    fn check(&self, url: &Url) -> TargetPolicyResult<()> {
        for policy in &self.policies {
            policy.check(url)?;
        }

        Ok(())
    }
}
