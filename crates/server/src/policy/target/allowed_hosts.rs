use super::{TargetPolicy, TargetPolicyError, TargetPolicyResult};
use std::collections::HashSet;
use url::Url;

/// A policy that only permits relaying to an explicit list of hosts.
///
/// Hosts are compared case-insensitively and must match exactly; a listed
/// domain does not permit its subdomains.
#[derive(Debug, Default)]
pub struct AllowedHostsPolicy {
    hosts: HashSet<String>,
}

impl AllowedHostsPolicy {
    /// Creates a new allowed hosts policy.
    ///
    /// By default, no hosts are allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host that may be targeted.
    pub fn with_host(mut self, host: impl AsRef<str>) -> Self {
        self.hosts.insert(host.as_ref().trim().to_ascii_lowercase());
        self
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowedHostsPolicy {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |policy, host| policy.with_host(host))
    }
}

impl TargetPolicy for AllowedHostsPolicy {
    fn check(&self, url: &Url) -> TargetPolicyResult<()> {
        let host = url
            .host_str()
            .ok_or_else(|| TargetPolicyError::MissingHost(url.to_string()))?
            .to_ascii_lowercase();

        if !self.hosts.contains(&host) {
            return Err(TargetPolicyError::HostNotAllowed(host));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(policy: &AllowedHostsPolicy, url: &str) -> TargetPolicyResult<()> {
        policy.check(&url.parse().unwrap())
    }

    #[test]
    fn allows_listed_hosts_case_insensitively() {
        let policy: AllowedHostsPolicy = ["JSONPlaceholder.typicode.com", "[::1]"]
            .into_iter()
            .collect();

        check(&policy, "https://jsonplaceholder.typicode.com/users").unwrap();
        check(&policy, "http://[::1]:3000/").unwrap();
    }

    #[test]
    fn rejects_other_hosts_and_subdomains() {
        let policy = AllowedHostsPolicy::new().with_host("example.com");

        assert!(matches!(
            check(&policy, "https://api.example.com/"),
            Err(TargetPolicyError::HostNotAllowed(host)) if host == "api.example.com"
        ));
        assert!(check(&policy, "https://example.org/").is_err());
    }
}
