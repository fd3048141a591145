pub mod dns;

use crate::models::TransportProtocol;

pub const DNS_PORT: u16 = 53;

/// Extract a DNS message from a transport payload when either port is 53.
/// DNS over TCP carries a two-byte length prefix; only messages contained in
/// a single segment are decoded.
pub fn dns_payload(protocol: TransportProtocol, src_port: u16, dst_port: u16, payload: &[u8]) -> Option<&[u8]> {
    if src_port != DNS_PORT && dst_port != DNS_PORT {
        return None;
    }
    match protocol {
        TransportProtocol::Udp => Some(payload),
        TransportProtocol::Tcp if payload.len() > 2 => {
            let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
            payload.get(2..2 + len)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_payload_by_port() {
        let body = [0u8; 12];
        assert!(dns_payload(TransportProtocol::Udp, 53, 40000, &body).is_some());
        assert!(dns_payload(TransportProtocol::Udp, 5353, 40000, &body).is_none());
        assert!(dns_payload(TransportProtocol::Icmp, 53, 53, &body).is_none());
    }

    #[test]
    fn test_dns_over_tcp_strips_length() {
        let mut segment = vec![0x00, 0x0c];
        segment.extend_from_slice(&[0xAA; 12]);
        assert_eq!(dns_payload(TransportProtocol::Tcp, 40000, 53, &segment).unwrap().len(), 12);

        segment[1] = 0x40; // claims more than the segment holds
        assert!(dns_payload(TransportProtocol::Tcp, 40000, 53, &segment).is_none());
    }
}
