//! Ring-backed service discovery.
//!
//! Clients that fan out to every member (queriers talking to all ingesters,
//! for instance) use the ring as their address book.

use std::sync::Arc;

use corelib::{Error, Operation, Result};

use crate::ring::ReadRing;

pub struct RingServiceDiscovery {
    ring: Arc<dyn ReadRing>,
}

impl RingServiceDiscovery {
    pub fn new(ring: Arc<dyn ReadRing>) -> Self {
        Self { ring }
    }

    /// Addresses of every healthy member. An empty ring has no addresses.
    pub fn addresses(&self) -> Result<Vec<String>> {
        match self.ring.get_all_healthy(Operation::Reporting) {
            Ok(set) => Ok(set.addresses()),
            Err(Error::EmptyRing) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication_set::ReplicationSet;
    use corelib::{InstanceDesc, InstanceState};

    struct MockRing {
        result: Result<ReplicationSet>,
    }

    impl ReadRing for MockRing {
        fn get(&self, _key: u32, _op: Operation, _rf: usize) -> Result<ReplicationSet> {
            unimplemented!()
        }

        fn get_all_healthy(&self, _op: Operation) -> Result<ReplicationSet> {
            self.result.clone()
        }

        fn get_replication_set_for_operation(&self, _op: Operation) -> Result<ReplicationSet> {
            unimplemented!()
        }

        fn replication_factor(&self) -> usize {
            3
        }

        fn instances_count(&self) -> usize {
            0
        }
    }

    fn discovery(result: Result<ReplicationSet>) -> RingServiceDiscovery {
        RingServiceDiscovery::new(Arc::new(MockRing { result }))
    }

    #[test]
    fn test_empty_ring_has_no_addresses() {
        assert_eq!(discovery(Err(Error::EmptyRing)).addresses().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_other_errors_are_propagated() {
        let err = Error::TooManyUnhealthy {
            required: 2,
            found: 1,
            zone_aware: false,
        };
        assert_eq!(discovery(Err(err.clone())).addresses(), Err(err));
    }

    #[test]
    fn test_addresses_of_healthy_members() {
        let instances = ["1.1.1.1", "2.2.2.2"]
            .iter()
            .map(|addr| InstanceDesc::new(*addr, *addr, "", vec![], InstanceState::Active, 0))
            .collect();
        let mut addrs = discovery(Ok(ReplicationSet::new(instances, 0, 0))).addresses().unwrap();
        addrs.sort();
        assert_eq!(addrs, vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()]);
    }
}
