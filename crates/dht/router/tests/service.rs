mod common;

use assert_matches::assert_matches;
use tokio::time::Instant;
use vertex_dht_primitives::{BlockType, Identifier};
use vertex_dht_router::{
    DEFAULT_FIND_PEER_MAX_INTERVAL, DEFAULT_FIND_PEER_MIN_INTERVAL, Event, OutboundQueue,
    RouterService,
};
use vertex_dht_wire::DhtMessage;

use common::*;

#[tokio::test(start_paused = true)]
async fn first_connection_starts_find_peer_rounds() {
    init_tracing();
    let local = Identifier::digest(b"local");
    let (events, service) = RouterService::channel(router(local, 10.0), 16);
    let task = tokio::spawn(service.run());

    let (queue, mut rx) = OutboundQueue::bounded(16);
    events
        .send(Event::Connected(peer_in_bucket(&local, 42, 1), queue))
        .await
        .unwrap();
    let start = Instant::now();

    let first = rx.recv().await.unwrap();
    assert_matches!(first, DhtMessage::Get(g) if g.options.find_peer() && g.key == local && g.block_type == BlockType::HELLO);
    assert!(start.elapsed() < DEFAULT_FIND_PEER_MIN_INTERVAL);

    rx.recv().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= DEFAULT_FIND_PEER_MIN_INTERVAL, "{elapsed:?}");
    assert!(elapsed <= DEFAULT_FIND_PEER_MAX_INTERVAL, "{elapsed:?}");

    drop(events);
    let router = task.await.unwrap();
    assert_eq!(router.stats().find_peer_rounds, 2);
}

#[tokio::test(start_paused = true)]
async fn no_rounds_without_neighbours() {
    let local = Identifier::digest(b"local");
    let (events, service) = RouterService::channel(router(local, 10.0), 16);
    let task = tokio::spawn(service.run());

    let peer = peer_in_bucket(&local, 42, 1);
    let (queue, mut rx) = OutboundQueue::bounded(16);
    events.send(Event::Connected(peer, queue)).await.unwrap();
    rx.recv().await.unwrap();
    events.send(Event::Disconnected(peer)).await.unwrap();

    tokio::time::sleep(DEFAULT_FIND_PEER_MAX_INTERVAL * 3).await;
    drop(events);
    let router = task.await.unwrap();
    assert_eq!(router.stats().find_peer_rounds, 1);
    assert!(router.table().is_empty());
}
