//! Tests for ring lookups, store watching and change subscriptions.
//!
//! # Test Strategy
//!
//! 1. **Lookups**: walk order, zone spread, health filtering, empty ring
//! 2. **Whole-ring sets**: failure budgets with and without zones
//! 3. **Updates**: store watch, subscriptions, discovery

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use corelib::{unix_now, Error, InstanceDesc, InstanceState, Operation, RingDesc};
use kv::{cas_loop, BackoffConfig, Codec, InMemoryClient, KvClient};
use replication::{
    IgnoreUnhealthyInstancesReplicationStrategy, ReadRing, Ring, RingConfig, RingServiceDiscovery,
};
use tokio_util::sync::CancellationToken;

const STALE: i64 = 0;

fn instance(id: &str, zone: &str, tokens: &[u32], state: InstanceState) -> InstanceDesc {
    InstanceDesc::new(id, format!("{id}:9095"), zone, tokens.to_vec(), state, unix_now())
}

fn desc(instances: Vec<InstanceDesc>) -> RingDesc {
    let mut desc = RingDesc::new();
    for instance in instances {
        desc.add_instance(instance);
    }
    desc
}

fn ring(config: RingConfig, instances: Vec<InstanceDesc>) -> Ring {
    let ring = Ring::new(config).unwrap();
    ring.update(desc(instances));
    ring
}

fn zone_aware() -> RingConfig {
    RingConfig {
        zone_awareness_enabled: true,
        ..Default::default()
    }
}

fn ids(instances: &[InstanceDesc]) -> Vec<&str> {
    instances.iter().map(|i| i.id.as_str()).collect()
}

fn three_zones() -> Vec<InstanceDesc> {
    vec![
        instance("a", "zone-1", &[100], InstanceState::Active),
        instance("b", "zone-2", &[200], InstanceState::Active),
        instance("c", "zone-3", &[300], InstanceState::Active),
    ]
}

// ============================================================================
// Lookups
// ============================================================================

#[test]
fn test_get_returns_walk_order() {
    let ring = ring(RingConfig::default(), three_zones());

    let set = ring.get(50, Operation::Write, 3).unwrap();
    assert_eq!(ids(&set.instances), ["a", "b", "c"]);
    assert_eq!(set.max_errors, 1);
    assert_eq!(set.max_unavailable_zones, 0);

    let set = ring.get(250, Operation::Read, 3).unwrap();
    assert_eq!(ids(&set.instances), ["c", "a", "b"]);
}

#[test]
fn test_get_is_deterministic() {
    let ring = ring(RingConfig::default(), three_zones());
    let first = ring.get(12345, Operation::Read, 2).unwrap();
    for _ in 0..10 {
        assert_eq!(ring.get(12345, Operation::Read, 2).unwrap().instances, first.instances);
    }
}

#[test]
fn test_get_on_empty_ring() {
    let ring = Ring::new(RingConfig::default()).unwrap();
    assert_eq!(ring.get(1, Operation::Write, 3), Err(Error::EmptyRing));
    assert_eq!(ring.get_all_healthy(Operation::Read), Err(Error::EmptyRing));
    assert_eq!(ring.get_replication_set_for_operation(Operation::Read), Err(Error::EmptyRing));
}

#[test]
fn test_get_spreads_over_zones() {
    let ring = ring(
        zone_aware(),
        vec![
            instance("a1", "zone-a", &[100], InstanceState::Active),
            instance("a2", "zone-a", &[150], InstanceState::Active),
            instance("b1", "zone-b", &[200], InstanceState::Active),
            instance("b2", "zone-b", &[250], InstanceState::Active),
            instance("c1", "zone-c", &[300], InstanceState::Active),
            instance("c2", "zone-c", &[350], InstanceState::Active),
        ],
    );

    for key in [0, 120, 220, 320, 400] {
        let set = ring.get(key, Operation::Write, 3).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.zones().len(), 3, "key {key}");
    }
}

#[test]
fn test_get_too_many_unhealthy() {
    let mut stale_b = instance("b", "", &[200], InstanceState::Active);
    stale_b.timestamp = STALE;
    let ring = ring(
        RingConfig::default(),
        vec![
            instance("a", "", &[100], InstanceState::Active),
            stale_b,
            instance("c", "", &[300], InstanceState::Joining),
        ],
    );

    // Writes go to JOINING members, reads do not.
    let set = ring.get(0, Operation::Write, 3).unwrap();
    assert_eq!(ids(&set.instances), ["a", "c"]);
    assert_eq!(set.max_errors, 0);

    assert_eq!(
        ring.get(0, Operation::Read, 3),
        Err(Error::TooManyUnhealthy {
            required: 2,
            found: 1,
            zone_aware: false
        })
    );
}

#[test]
fn test_write_extends_over_leaving_member() {
    let ring = ring(
        RingConfig::default(),
        vec![
            instance("a", "", &[100], InstanceState::Active),
            instance("b", "", &[200], InstanceState::Leaving),
            instance("c", "", &[300], InstanceState::Active),
            instance("d", "", &[400], InstanceState::Active),
        ],
    );

    let set = ring.get(0, Operation::Write, 3).unwrap();
    assert_eq!(ids(&set.instances), ["a", "c", "d"]);
    assert_eq!(set.max_errors, 0);

    let set = ring.get(0, Operation::Read, 3).unwrap();
    assert_eq!(ids(&set.instances), ["a", "b", "c"]);
    assert_eq!(set.max_errors, 1);
}

#[test]
fn test_ignore_unhealthy_strategy() {
    let ring = Ring::with_strategy(
        RingConfig::default(),
        Arc::new(IgnoreUnhealthyInstancesReplicationStrategy::new()),
    )
    .unwrap();
    let mut stale = instance("b", "", &[200], InstanceState::Active);
    stale.timestamp = STALE;
    let mut stale_c = instance("c", "", &[300], InstanceState::Active);
    stale_c.timestamp = STALE;
    ring.update(desc(vec![instance("a", "", &[100], InstanceState::Active), stale, stale_c]));

    let set = ring.get(0, Operation::Read, 3).unwrap();
    assert_eq!(ids(&set.instances), ["a"]);
    assert_eq!(set.max_errors, 0);
}

#[test]
fn test_instance_state() {
    let ring = ring(RingConfig::default(), three_zones());
    assert_eq!(ring.instance_state("a"), Ok(InstanceState::Active));
    assert_eq!(ring.instance_state("zz"), Err(Error::InstanceNotFound("zz".into())));
    assert!(ring.has_instance("b"));
    assert_eq!(ring.instances_count(), 3);
    assert_eq!(ring.zones_count(), 3);
}

// ============================================================================
// Whole-ring sets
// ============================================================================

#[test]
fn test_get_all_healthy_drops_unhealthy() {
    let mut stale = instance("b", "", &[200], InstanceState::Active);
    stale.timestamp = STALE;
    let ring = ring(
        RingConfig::default(),
        vec![
            instance("a", "", &[100], InstanceState::Active),
            stale,
            instance("c", "", &[300], InstanceState::Joining),
        ],
    );

    let set = ring.get_all_healthy(Operation::Read).unwrap();
    assert_eq!(ids(&set.instances), ["a"]);
    assert_eq!(set.max_errors, 0);

    let set = ring.get_all_healthy(Operation::Reporting).unwrap();
    assert_eq!(ids(&set.instances), ["a", "c"]);
}

#[test]
fn test_replication_set_for_operation_budget() {
    let members = (0..5)
        .map(|n| instance(&format!("i{n}"), "", &[n * 100 + 1], InstanceState::Active))
        .collect();
    let ring = ring(RingConfig::default(), members);

    let set = ring.get_replication_set_for_operation(Operation::Read).unwrap();
    assert_eq!(set.len(), 5);
    assert_eq!(set.max_errors, 1);
}

#[test]
fn test_replication_set_for_operation_too_many_unhealthy() {
    let mut members: Vec<InstanceDesc> = (0..3)
        .map(|n| instance(&format!("i{n}"), "", &[n * 100 + 1], InstanceState::Active))
        .collect();
    members[0].timestamp = STALE;
    members[1].state = InstanceState::Joining;
    let ring = ring(RingConfig::default(), members);

    assert!(matches!(
        ring.get_replication_set_for_operation(Operation::Read),
        Err(Error::TooManyUnhealthy { required: 2, found: 1, .. })
    ));
}

#[test]
fn test_replication_set_for_operation_with_zones() {
    let members = vec![
        instance("a1", "zone-a", &[100], InstanceState::Active),
        instance("a2", "zone-a", &[150], InstanceState::Active),
        instance("b1", "zone-b", &[200], InstanceState::Active),
        instance("b2", "zone-b", &[250], InstanceState::Active),
        instance("c1", "zone-c", &[300], InstanceState::Active),
        instance("c2", "zone-c", &[350], InstanceState::Active),
    ];

    let healthy = ring(zone_aware(), members.clone());
    let set = healthy.get_replication_set_for_operation(Operation::Read).unwrap();
    assert_eq!(set.len(), 6);
    assert_eq!(set.max_errors, 0);
    assert_eq!(set.max_unavailable_zones, 1);

    // One unhealthy member takes its whole zone out and spends the zone budget.
    let mut one_down = members.clone();
    one_down[2].timestamp = STALE;
    let set = ring(zone_aware(), one_down)
        .get_replication_set_for_operation(Operation::Read)
        .unwrap();
    assert_eq!(ids(&set.instances), ["a1", "a2", "c1", "c2"]);
    assert_eq!(set.max_errors, 0);
    assert_eq!(set.max_unavailable_zones, 0);

    // A whole zone down is within the zone budget.
    let mut zone_down = members.clone();
    zone_down[2].timestamp = STALE;
    zone_down[3].timestamp = STALE;
    let set = ring(zone_aware(), zone_down)
        .get_replication_set_for_operation(Operation::Read)
        .unwrap();
    assert_eq!(ids(&set.instances), ["a1", "a2", "c1", "c2"]);
    assert_eq!(set.max_errors, 0);
    assert_eq!(set.max_unavailable_zones, 0);

    let mut two_down = members;
    two_down[0].timestamp = STALE;
    two_down[2].timestamp = STALE;
    assert!(matches!(
        ring(zone_aware(), two_down).get_replication_set_for_operation(Operation::Read),
        Err(Error::TooManyUnhealthy { zone_aware: true, .. })
    ));
}

// ============================================================================
// Updates
// ============================================================================

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

async fn wait_for(ring: &Ring, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while ring.instances_count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_watch_applies_store_updates() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let client = Arc::new(InMemoryClient::new());
    let ring = Arc::new(Ring::new(RingConfig::default()).unwrap());
    let cancel = CancellationToken::new();
    let handle = ring.watch(client.clone(), cancel.clone());

    for id in ["a", "b"] {
        cas_loop::<RingDesc, _>(client.as_ref(), Codec::Json, "ring", &fast_backoff(), |current| {
            let mut desc = current.unwrap_or_default();
            desc.add_instance(instance(id, "", &[id.as_bytes()[0] as u32], InstanceState::Active));
            Some(desc)
        })
        .await
        .unwrap();
    }
    wait_for(&ring, 2).await;

    // Garbage is skipped, the last good ring stays.
    let current = client.get("ring").await.unwrap().unwrap();
    client
        .cas("ring", Some(current.version), Bytes::from_static(b"{not a ring"))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ring.instances_count(), 2);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_subscribe_reports_only_structural_changes() {
    let ring = Arc::new(Ring::new(RingConfig::default()).unwrap());
    let mut watcher = ring.subscribe(Operation::Read);

    let base = three_zones();
    ring.update(desc(base.clone()));
    let first = watcher.changed().await.unwrap();
    assert_eq!(first.len(), 3);

    // Heartbeat-only update.
    let mut heartbeat = base.clone();
    for i in &mut heartbeat {
        i.timestamp -= 1;
    }
    ring.update(desc(heartbeat));
    assert!(tokio::time::timeout(Duration::from_millis(50), watcher.changed())
        .await
        .is_err());

    let mut grown = base;
    grown.push(instance("d", "zone-1", &[400], InstanceState::Active));
    ring.update(desc(grown));
    let next = watcher.changed().await.unwrap();
    assert_eq!(next.len(), 4);

    drop(ring);
    assert!(watcher.changed().await.is_none());
}

#[test]
fn test_discovery_over_ring() {
    let mut leaving = instance("c", "", &[300], InstanceState::Leaving);
    leaving.addr = "10.0.0.3:9095".into();
    let ring: Arc<dyn ReadRing> = Arc::new(ring(
        RingConfig::default(),
        vec![
            instance("a", "", &[100], InstanceState::Active),
            leaving,
            instance("d", "", &[400], InstanceState::Left),
        ],
    ));
    assert_eq!(ring.instances_count(), 2);
    let discovery = RingServiceDiscovery::new(ring);

    let mut addrs = discovery.addresses().unwrap();
    addrs.sort();
    assert_eq!(addrs, vec!["10.0.0.3:9095".to_string(), "a:9095".to_string()]);

    let empty = RingServiceDiscovery::new(Arc::new(Ring::new(RingConfig::default()).unwrap()));
    assert!(empty.addresses().unwrap().is_empty());
}
