use super::{TargetPolicy, TargetPolicyError, TargetPolicyResult};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// A policy that rejects targets on loopback, private and other
/// non-public networks.
///
/// Only literal IP addresses and `localhost` names are checked; host
/// names are not resolved, so a public name that resolves to a private
/// address is not rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicNetworkPolicy;

impl TargetPolicy for PublicNetworkPolicy {
    fn check(&self, url: &Url) -> TargetPolicyResult<()> {
        let public = match url.host() {
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                domain != "localhost" && !domain.ends_with(".localhost")
            }
            Some(Host::Ipv4(ip)) => is_public_v4(&ip),
            Some(Host::Ipv6(ip)) => is_public_v6(&ip),
            None => return Err(TargetPolicyError::MissingHost(url.to_string())),
        };

        if !public {
            return Err(TargetPolicyError::NonPublicHost(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }

        Ok(())
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 is carrier-grade NAT space.
    let shared = a == 100 && (b & 0xc0) == 64;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared
        || a == 0)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }

    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(url: &str) -> TargetPolicyResult<()> {
        PublicNetworkPolicy.check(&url.parse().unwrap())
    }

    #[test]
    fn allows_public_targets() {
        for url in [
            "https://jsonplaceholder.typicode.com/posts",
            "http://93.184.215.14/",
            "http://[2606:2800:220:1:248:1893:25c8:1946]/",
        ] {
            check(url).unwrap_or_else(|e| panic!("{url}: {e}"));
        }
    }

    #[test]
    fn rejects_non_public_targets() {
        for url in [
            "http://localhost:3000/",
            "http://LOCALHOST./",
            "http://api.localhost/",
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/",
            "http://0.0.0.0/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:127.0.0.1]/",
        ] {
            assert!(
                matches!(check(url), Err(TargetPolicyError::NonPublicHost(_))),
                "{url} should be rejected"
            );
        }
    }
}
