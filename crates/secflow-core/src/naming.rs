use crate::models::{NameSource, Secflow};
use crate::pdns::PassiveDnsStore;

/// Name every Secflow after its destination. Must run after all input has
/// been parsed so names seen late in the input still apply to early flows.
/// Returns how many Secflows received a hostname.
pub fn name_destinations(secflows: &mut [Secflow], dns: &PassiveDnsStore) -> usize {
    let mut named = 0;
    for flow in secflows.iter_mut() {
        match dns.resolve(flow.key.dst) {
            Some(host) => {
                flow.name = host.to_string();
                flow.name_source = NameSource::PassiveDns;
                named += 1;
            }
            None => {
                flow.name = flow.key.dst.to_string();
                flow.name_source = NameSource::Address;
            }
        }
    }
    tracing::debug!(named, total = secflows.len(), "named destinations");
    named
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localnet::LocalNetworks;
    use crate::aggregate::FlowAggregator;
    use crate::models::*;
    use chrono::DateTime;

    fn flows(dsts: &[&str]) -> FlowAggregator {
        let local = LocalNetworks::default();
        let mut agg = FlowAggregator::new();
        for (i, dst) in dsts.iter().enumerate() {
            let key = FlowKey::new("10.0.0.1".parse().unwrap(), 40000 + i as u16, dst.parse().unwrap(), 443, TransportProtocol::Tcp);
            agg.fold(&FlowObservation::packet(key, DateTime::from_timestamp(1_700_000_000, 0).unwrap(), 60), &local);
        }
        agg
    }

    #[test]
    fn test_resolved_destination_gets_hostname() {
        let mut dns = PassiveDnsStore::in_memory();
        dns.record_observation("1.2.3.4".parse().unwrap(), "example.com");

        let mut agg = flows(&["1.2.3.4", "5.6.7.8"]);
        assert_eq!(name_destinations(agg.secflows_mut(), &dns), 1);

        let named = &agg.secflows()[0];
        assert_eq!(named.name, "example.com");
        assert_eq!(named.name_source, NameSource::PassiveDns);

        let raw = &agg.secflows()[1];
        assert_eq!(raw.name, "5.6.7.8");
        assert_eq!(raw.name_source, NameSource::Address);
    }

    #[test]
    fn test_source_address_is_not_used_for_naming() {
        let mut dns = PassiveDnsStore::in_memory();
        dns.record_observation("10.0.0.1".parse().unwrap(), "workstation.lan");

        let mut agg = flows(&["2001:db8::1"]);
        name_destinations(agg.secflows_mut(), &dns);
        assert_eq!(agg.secflows()[0].name, "2001:db8::1");
    }
}
