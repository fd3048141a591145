use std::collections::HashMap;

use crate::localnet::LocalNetworks;
use crate::models::*;

/// Identity of one Secflow: the endpoint tuple plus an optional session
/// discriminator for inputs that already delimit connections.
type FlowId = (FlowKey, Option<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    Created,
    Updated,
}

/// Folds flow observations into Secflows. Insertion order is preserved so
/// that output stays stable for identical input.
#[derive(Debug, Default)]
pub struct FlowAggregator {
    index: HashMap<FlowId, usize>,
    flows: Vec<Secflow>,
}

impl FlowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. The caller has already dropped local-to-local
    /// traffic; `local` only decides the direction of a new Secflow.
    pub fn fold(&mut self, obs: &FlowObservation, local: &LocalNetworks) -> Fold {
        let forward = (obs.key, obs.session.clone());
        if let Some(&idx) = self.index.get(&forward) {
            apply(&mut self.flows[idx], obs);
            return Fold::Updated;
        }

        let reverse = (obs.key.reversed(), obs.session.clone());
        if let Some(&idx) = self.index.get(&reverse) {
            apply(&mut self.flows[idx], &obs.flipped());
            return Fold::Updated;
        }

        // A reply seen before its request still names the client as source.
        let oriented = match obs.hint {
            Some(SenderRole::Server) => obs.flipped(),
            _ => obs.clone(),
        };

        let direction = classify(&oriented.key, local);
        let mut flow = Secflow::open(oriented.key, oriented.session.clone(), direction, oriented.timestamp);
        apply(&mut flow, &oriented);

        self.index.insert((oriented.key, oriented.session), self.flows.len());
        self.flows.push(flow);
        Fold::Created
    }

    /// Second pass: flow end is only known once every observation is in.
    pub fn finalize_durations(&mut self) {
        for flow in &mut self.flows {
            let span = flow.end_time.signed_duration_since(flow.start_time);
            flow.duration = span
                .num_microseconds()
                .map(|us| us as f64 / 1_000_000.0)
                .unwrap_or_else(|| span.num_milliseconds() as f64 / 1000.0)
                .max(0.0);
        }
    }

    pub fn secflows(&self) -> &[Secflow] {
        &self.flows
    }

    /// Mutable access for naming; identity fields must not be touched.
    pub fn secflows_mut(&mut self) -> &mut [Secflow] {
        &mut self.flows
    }

    /// Secflows ordered by start time, then identity.
    pub fn sorted(&self) -> Vec<Secflow> {
        let mut flows = self.flows.clone();
        flows.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.key.cmp(&b.key))
                .then_with(|| a.session.cmp(&b.session))
        });
        flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

fn apply(flow: &mut Secflow, obs: &FlowObservation) {
    // log counters are untrusted; saturate
    flow.source_bytes = flow.source_bytes.saturating_add(obs.src_bytes);
    flow.dest_bytes = flow.dest_bytes.saturating_add(obs.dst_bytes);
    flow.source_packets = flow.source_packets.saturating_add(obs.src_packets);
    flow.dest_packets = flow.dest_packets.saturating_add(obs.dst_packets);

    if obs.timestamp < flow.start_time {
        flow.start_time = obs.timestamp;
    }
    let end = obs.end.unwrap_or(obs.timestamp).max(obs.timestamp);
    if end > flow.end_time {
        flow.end_time = end;
    }
}

fn classify(key: &FlowKey, local: &LocalNetworks) -> Direction {
    match (local.is_local(key.src), local.is_local(key.dst)) {
        (true, false) => Direction::Outbound,
        (false, true) => Direction::Inbound,
        _ => Direction::External,
    }
}
