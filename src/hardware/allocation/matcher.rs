//! Default Matchers
//!
//! Stock implementations of the matcher ports. Deployments with richer
//! matching rules (processors, memory, security attributes) plug in their own.

use crate::domain::{
    ComputerSystem, ComputerSystemMatcher, EthernetInterface, EthernetInterfacesAllocationMapper, Id,
    RequestedEthernetInterface, RequestedNode,
};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::sync::Arc;

// =============================================================================
// Ethernet Interfaces
// =============================================================================

/// Pairs NICs by link speed and switch connectivity
///
/// A physical NIC serves a request when it is at least as fast as requested
/// (an unknown speed only serves requests without one) and, for VLAN
/// requests, is cabled to a manageable switch port. Requests asking for
/// VLANs are placed first, then faster ones; each takes the first free NIC
/// in interface order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedAwareEthernetInterfacesMapper;

impl SpeedAwareEthernetInterfacesMapper {
    fn serves(available: &EthernetInterface, requested: &RequestedEthernetInterface) -> bool {
        let speed_ok = match (requested.speed_mbps, available.speed_mbps) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => actual >= wanted,
            (Some(_), None) => false,
        };
        let vlans_ok = !requested.has_vlans() || available.has_neighbor_port();
        speed_ok && vlans_ok
    }
}

impl EthernetInterfacesAllocationMapper for SpeedAwareEthernetInterfacesMapper {
    fn map(
        &self,
        available: &[EthernetInterface],
        requested: &[RequestedEthernetInterface],
    ) -> Option<IndexMap<Id, RequestedEthernetInterface>> {
        if requested.len() > available.len() {
            return None;
        }

        let mut order: Vec<&RequestedEthernetInterface> = requested.iter().collect();
        order.sort_by_key(|r| (Reverse(r.has_vlans()), Reverse(r.speed_mbps)));

        let mut mapping = IndexMap::with_capacity(requested.len());
        for request in order {
            let interface = available
                .iter()
                .filter(|i| !mapping.contains_key(&i.id))
                .find(|i| Self::serves(i, request))?;
            mapping.insert(interface.id, request.clone());
        }

        Some(mapping)
    }
}

// =============================================================================
// Computer Systems
// =============================================================================

/// Keeps enabled, healthy systems whose NICs can satisfy the request
#[derive(Clone)]
pub struct BasicComputerSystemMatcher {
    mapper: Arc<dyn EthernetInterfacesAllocationMapper>,
}

impl BasicComputerSystemMatcher {
    pub fn new(mapper: Arc<dyn EthernetInterfacesAllocationMapper>) -> Self {
        Self { mapper }
    }
}

impl Default for BasicComputerSystemMatcher {
    fn default() -> Self {
        Self::new(Arc::new(SpeedAwareEthernetInterfacesMapper))
    }
}

impl ComputerSystemMatcher for BasicComputerSystemMatcher {
    fn matches(&self, request: &RequestedNode, candidates: Vec<ComputerSystem>) -> Vec<ComputerSystem> {
        candidates
            .into_iter()
            .filter(ComputerSystem::is_enabled_and_healthy)
            .filter(|system| {
                self.mapper
                    .map(&system.ethernet_interfaces, &request.ethernet_interfaces)
                    .is_some()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Health, RequestedVlan, State, Status};

    fn nic(id: u64, speed: Option<u32>, linked: bool) -> EthernetInterface {
        EthernetInterface {
            id: Id(id),
            name: format!("eth{}", id),
            mac_address: None,
            speed_mbps: speed,
            neighbor_port: linked.then(|| "sw1/1".to_string()),
            status: Status::enabled_ok(),
        }
    }

    fn wanted(speed: Option<u32>, vlan: bool) -> RequestedEthernetInterface {
        RequestedEthernetInterface {
            speed_mbps: speed,
            primary_vlan: None,
            vlans: vlan.then(|| {
                vec![RequestedVlan {
                    vlan_id: 1,
                    tagged: true,
                }]
            }),
        }
    }

    #[test]
    fn test_slower_request_matches_faster_nic() {
        let available = [nic(1, Some(100), false), nic(2, Some(1000), false)];
        let requested = [wanted(Some(100), false), wanted(Some(200), false)];

        let mapping = SpeedAwareEthernetInterfacesMapper.map(&available, &requested).unwrap();

        assert_eq!(mapping.get(&Id(2)).and_then(|r| r.speed_mbps), Some(200));
        assert_eq!(mapping.get(&Id(1)).and_then(|r| r.speed_mbps), Some(100));
    }

    #[test]
    fn test_faster_request_does_not_match() {
        let available = [nic(1, Some(100), false), nic(2, Some(1000), false)];
        assert!(SpeedAwareEthernetInterfacesMapper
            .map(&available, &[wanted(Some(1001), false)])
            .is_none());
    }

    #[test]
    fn test_vlans_need_linked_interface() {
        let unlinked = [nic(1, Some(100), false)];
        let linked = [nic(1, Some(100), true)];

        assert!(SpeedAwareEthernetInterfacesMapper
            .map(&unlinked, &[wanted(Some(100), true)])
            .is_none());
        assert!(SpeedAwareEthernetInterfacesMapper
            .map(&linked, &[wanted(Some(100), true)])
            .is_some());
    }

    #[test]
    fn test_unknown_speed_only_serves_speedless_requests() {
        let available = [nic(1, None, true), nic(2, None, true)];

        assert!(SpeedAwareEthernetInterfacesMapper
            .map(&available, &[wanted(Some(100), true)])
            .is_none());
        assert!(SpeedAwareEthernetInterfacesMapper
            .map(&available, &[wanted(None, true), wanted(None, true)])
            .is_some());
    }

    #[test]
    fn test_more_requested_than_available() {
        let available = [nic(1, Some(100), true), nic(2, Some(1000), true)];
        let requested = [
            wanted(Some(10), true),
            wanted(Some(20), true),
            wanted(Some(30), true),
        ];
        assert!(SpeedAwareEthernetInterfacesMapper.map(&available, &requested).is_none());
    }

    #[test]
    fn test_matcher_skips_unhealthy_systems() {
        let healthy = ComputerSystem {
            id: Id(1),
            uuid: None,
            name: "healthy".into(),
            description: None,
            system_type: Default::default(),
            service: Id(9),
            status: Status::enabled_ok(),
            power_state: Default::default(),
            allocated: false,
            composed_node: None,
            ethernet_interfaces: vec![nic(10, Some(1000), true)],
            local_drives: Vec::new(),
            simple_storages: Vec::new(),
        };
        let mut unhealthy = healthy.clone();
        unhealthy.id = Id(2);
        unhealthy.status = Status::new(State::Enabled, Some(Health::Critical), None);

        let request = RequestedNode::new("node").with_ethernet_interface(wanted(Some(1000), true));
        let matched = BasicComputerSystemMatcher::default().matches(&request, vec![unhealthy, healthy]);

        assert_eq!(matched.iter().map(|s| s.id).collect::<Vec<_>>(), vec![Id(1)]);
    }
}
