//! Classification of private, link-local and loopback addresses.

use std::net::IpAddr;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

use crate::error::{ConvertError, Result};

/// IPv4 ranges that never leave the local network.
const LOCAL_V4: &[(&str, &str)] = &[
    ("10.0.0.0/8", "Private (RFC1918)"),
    ("172.16.0.0/12", "Private (RFC1918)"),
    ("192.168.0.0/16", "Private (RFC1918)"),
    ("127.0.0.0/8", "Loopback"),
    ("169.254.0.0/16", "Link-Local"),
    ("0.0.0.0/8", "This network"),
    ("100.64.0.0/10", "Shared address space (RFC6598)"),
    ("224.0.0.0/24", "Link-local multicast"),
    ("255.255.255.255/32", "Limited broadcast"),
];

const LOCAL_V6: &[(&str, &str)] = &[
    ("::/128", "Unspecified"),
    ("::1/128", "Loopback"),
    ("fc00::/7", "Unique Local"),
    ("fe80::/10", "Link-Local"),
    ("ff02::/16", "Link-local multicast"),
];

#[derive(Debug, Clone)]
pub struct LocalNetworks {
    networks: Vec<IpNetwork>,
}

impl Default for LocalNetworks {
    fn default() -> Self {
        let mut networks = Vec::with_capacity(LOCAL_V4.len() + LOCAL_V6.len());
        for (cidr, _) in LOCAL_V4 {
            if let Ok(net) = cidr.parse::<Ipv4Network>() {
                networks.push(IpNetwork::V4(net));
            }
        }
        for (cidr, _) in LOCAL_V6 {
            if let Ok(net) = cidr.parse::<Ipv6Network>() {
                networks.push(IpNetwork::V6(net));
            }
        }
        Self { networks }
    }
}

impl LocalNetworks {
    /// Default ranges plus site-specific CIDRs from the configuration.
    pub fn with_extra(extra: &[String]) -> Result<Self> {
        let mut local = Self::default();
        for cidr in extra {
            let net = cidr
                .trim()
                .parse::<IpNetwork>()
                .map_err(|e| ConvertError::Config(format!("invalid local network '{cidr}': {e}")))?;
            local.networks.push(net);
        }
        Ok(local)
    }

    pub fn is_local(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => ip,
            },
            v4 => v4,
        };
        self.networks.iter().any(|net| net.contains(ip))
    }

    /// Both endpoints local: the observation never becomes a Secflow.
    pub fn is_local_pair(&self, src: IpAddr, dst: IpAddr) -> bool {
        self.is_local(src) && self.is_local(dst)
    }
}

/// Check an address against the built-in ranges only.
pub fn is_local(ip: IpAddr) -> bool {
    thread_local! {
        static DEFAULT: LocalNetworks = LocalNetworks::default();
    }
    DEFAULT.with(|local| local.is_local(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_private_v4_ranges() {
        for addr in ["10.0.0.1", "172.16.5.4", "172.31.255.255", "192.168.1.1", "127.0.0.1", "169.254.10.10"] {
            assert!(is_local(parse(addr)), "{addr} should be local");
        }
        for addr in ["8.8.8.8", "172.32.0.1", "93.184.216.34", "224.0.1.1"] {
            assert!(!is_local(parse(addr)), "{addr} should not be local");
        }
    }

    #[test]
    fn test_v6_ranges() {
        assert!(is_local(parse("::1")));
        assert!(is_local(parse("fd12:3456::1")));
        assert!(is_local(parse("fe80::1")));
        assert!(is_local(parse("ff02::fb")));
        assert!(!is_local(parse("2606:4700::1111")));
    }

    #[test]
    fn test_v4_mapped_v6_uses_embedded_address() {
        assert!(is_local(parse("::ffff:192.168.0.1")));
        assert!(!is_local(parse("::ffff:8.8.8.8")));
    }

    #[test]
    fn test_extra_networks() {
        let local = LocalNetworks::with_extra(&["198.51.100.0/24".to_string()]).unwrap();
        assert!(local.is_local(parse("198.51.100.7")));
        assert!(!LocalNetworks::default().is_local(parse("198.51.100.7")));
        assert!(LocalNetworks::with_extra(&["not-a-cidr".to_string()]).is_err());
    }

    #[test]
    fn test_local_pair() {
        let local = LocalNetworks::default();
        assert!(local.is_local_pair(parse("10.0.0.1"), parse("10.0.0.2")));
        assert!(!local.is_local_pair(parse("10.0.0.1"), parse("93.184.216.34")));
    }
}
