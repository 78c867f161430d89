use std::sync::Arc;

use crate::endpoint::EndpointDescriptor;
use crate::probe::LoadSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankPolicy {
    pub prefer_idle: bool,
    pub busy_threshold: u32,
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self {
            prefer_idle: true,
            busy_threshold: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Idle,
    Busy,
    /// Prefer-idle disabled: no partitioning.
    Flat,
}

#[derive(Debug, Clone)]
pub struct RankedEndpoint {
    pub endpoint: Arc<EndpointDescriptor>,
    pub depth: Option<u32>,
    pub tier: Tier,
}

/// Attempt order for one request: depth ascending (unknown last), then name.
/// With prefer-idle, endpoints at or under the busy threshold come first.
pub fn rank(samples: Vec<LoadSample>, policy: RankPolicy) -> Vec<RankedEndpoint> {
    let mut samples = samples;
    samples.sort_by(|a, b| {
        effective_depth(a.depth)
            .cmp(&effective_depth(b.depth))
            .then_with(|| a.endpoint.name.cmp(&b.endpoint.name))
    });

    let ranked = samples.into_iter().map(|s| {
        let tier = if !policy.prefer_idle {
            Tier::Flat
        } else if effective_depth(s.depth) <= u64::from(policy.busy_threshold) {
            Tier::Idle
        } else {
            Tier::Busy
        };
        RankedEndpoint {
            endpoint: s.endpoint,
            depth: s.depth,
            tier,
        }
    });

    if !policy.prefer_idle {
        return ranked.collect();
    }
    let (idle, busy): (Vec<_>, Vec<_>) = ranked.partition(|r| r.tier == Tier::Idle);
    idle.into_iter().chain(busy).collect()
}

// Unknown sorts behind every measured depth, however deep.
fn effective_depth(depth: Option<u32>) -> u64 {
    depth.map_or(u64::MAX, u64::from)
}
