use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const TYPE_A: u16 = 1;
const TYPE_AAAA: u16 = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub owner: String,
    pub address: IpAddr,
}

#[derive(Debug, Clone, Default)]
pub struct DnsMessage {
    pub is_response: bool,
    pub rcode: u8,
    pub questions: Vec<String>,
    pub answers: Vec<DnsAnswer>,
}

impl DnsMessage {
    /// Address-to-name pairs worth remembering. Answers are attributed to the
    /// name the client asked for, not the last CNAME target.
    pub fn resolutions(&self) -> Vec<(IpAddr, String)> {
        if !self.is_response || self.rcode != 0 {
            return Vec::new();
        }
        let asked = self.questions.first();
        self.answers
            .iter()
            .map(|a| (a.address, asked.unwrap_or(&a.owner).clone()))
            .collect()
    }
}

/// Decode a DNS message as carried in a UDP datagram (no length prefix).
pub fn parse_message(data: &[u8]) -> Option<DnsMessage> {
    if data.len() < 12 {
        return None;
    }

    let flags = u16::from_be_bytes([data[2], data[3]]);
    let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;

    let mut msg = DnsMessage {
        is_response: flags & 0x8000 != 0,
        rcode: (flags & 0x000F) as u8,
        ..DnsMessage::default()
    };

    let mut offset = 12;
    for _ in 0..qdcount {
        let (name, next) = read_name(data, offset)?;
        offset = next + 4; // qtype + qclass
        if offset > data.len() {
            return Some(msg);
        }
        msg.questions.push(name);
    }

    if !msg.is_response {
        return Some(msg);
    }

    for _ in 0..ancount {
        let Some((owner, next)) = read_name(data, offset) else {
            break;
        };
        offset = next;
        if offset + 10 > data.len() {
            break;
        }

        let rtype = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let rdlength = u16::from_be_bytes([data[offset + 8], data[offset + 9]]) as usize;
        offset += 10;
        if offset + rdlength > data.len() {
            break;
        }
        let rdata = &data[offset..offset + rdlength];

        match rtype {
            TYPE_A if rdlength == 4 => msg.answers.push(DnsAnswer {
                owner,
                address: IpAddr::V4(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3])),
            }),
            TYPE_AAAA if rdlength == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                msg.answers.push(DnsAnswer {
                    owner,
                    address: IpAddr::V6(Ipv6Addr::from(octets)),
                });
            }
            _ => {}
        }
        offset += rdlength;
    }

    Some(msg)
}

/// Read a possibly compressed name starting at `offset`. Returns the name and
/// the offset just past it in the original record.
fn read_name(data: &[u8], mut offset: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut resume: Option<usize> = None;
    let mut hops = 0;

    loop {
        let len = *data.get(offset)? as usize;

        if len == 0 {
            offset += 1;
            break;
        }

        if len & 0xC0 == 0xC0 {
            let low = *data.get(offset + 1)? as usize;
            hops += 1;
            if hops > 32 {
                return None;
            }
            resume.get_or_insert(offset + 2);
            offset = ((len & 0x3F) << 8) | low;
            continue;
        }

        let label = data.get(offset + 1..offset + 1 + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += 1 + len;
    }

    let name = if labels.is_empty() { ".".to_string() } else { labels.join(".") };
    Some((name, resume.unwrap_or(offset)))
}
