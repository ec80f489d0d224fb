//! Integration tests for the typed CAS loop over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use corelib::{InstanceDesc, InstanceState, RingDesc};
use futures::StreamExt;
use kv::{cas_loop, get_typed, BackoffConfig, Codec, InMemoryClient, KvClient};

const RING_KEY: &str = "ring";

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn instance(id: &str, tokens: Vec<u32>) -> InstanceDesc {
    InstanceDesc::new(id, format!("{id}:9095"), "zone-a", tokens, InstanceState::Active, 1_700_000_000)
}

#[tokio::test]
async fn test_concurrent_writers_never_lose_updates() {
    let client = Arc::new(InMemoryClient::new());
    let mut handles = Vec::new();

    for n in 0..16u32 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            cas_loop::<RingDesc, _>(client.as_ref(), Codec::Json, RING_KEY, &fast_backoff(), |desc| {
                let mut desc = desc.unwrap_or_default();
                desc.add_instance(instance(&format!("ingester-{n}"), vec![n]));
                Some(desc)
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let desc: RingDesc = get_typed(client.as_ref(), Codec::Json, RING_KEY).await.unwrap().unwrap();
    assert_eq!(desc.len(), 16);
    assert_eq!(desc.taken_tokens().len(), 16);
}

#[tokio::test]
async fn test_returning_none_skips_the_write() {
    let client = InMemoryClient::new();
    let written = cas_loop::<RingDesc, _>(&client, Codec::Json, RING_KEY, &fast_backoff(), |_| None)
        .await
        .unwrap();

    assert!(written.is_none());
    assert!(client.get(RING_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_codecs_round_trip_ring_desc() {
    let mut desc = RingDesc::new();
    desc.add_instance(instance("ingester-1", vec![1, 500, u32::MAX]));
    let mut leaving = instance("ingester-2", vec![42]);
    leaving.state = InstanceState::Leaving;
    leaving.zone = String::new();
    leaving.registered_timestamp = 1_600_000_000;
    desc.add_instance(leaving);

    for codec in [Codec::Json, Codec::Bincode] {
        let encoded = codec.encode(&desc).unwrap();
        let decoded: RingDesc = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, desc, "{codec:?} round trip");
    }
}

#[tokio::test]
async fn test_undecodable_value_is_an_error() {
    let client = InMemoryClient::new();
    client
        .cas(RING_KEY, None, bytes::Bytes::from_static(b"not json"))
        .await
        .unwrap();

    let result = cas_loop::<RingDesc, _>(&client, Codec::Json, RING_KEY, &fast_backoff(), |desc| desc).await;
    assert!(matches!(result, Err(kv::Error::Codec(_))));
}

#[tokio::test]
async fn test_watch_sees_cas_loop_writes() {
    let client = InMemoryClient::new();
    let mut updates = client.watch_key(RING_KEY);

    cas_loop::<RingDesc, _>(&client, Codec::Bincode, RING_KEY, &fast_backoff(), |desc| {
        let mut desc = desc.unwrap_or_default();
        desc.add_instance(instance("ingester-1", vec![7]));
        Some(desc)
    })
    .await
    .unwrap();

    let update = updates.next().await.unwrap();
    let desc: RingDesc = Codec::Bincode.decode(&update.value).unwrap();
    assert!(desc.instance("ingester-1").is_some());
}
