//! Join-time migration across a simulated ring.
//!
//! Files are seeded on the node that owns them, a new node joins, and the
//! coordinator must pull exactly the files whose keys now fall in the new
//! node's interval from its successor.

use ringshift_core::NodeError;
use ringshift_discovery::{NodeInfo, RingKey, hash_key};
use ringshift_integration_tests::fixtures::SimRing;
use std::collections::BTreeMap;

const CHUNK_SIZE: usize = 64;

/// First node clockwise from `key`
fn owner(ring: &[NodeInfo], key: RingKey) -> &NodeInfo {
    ring.iter().find(|n| n.id >= key).unwrap_or(&ring[0])
}

fn payload(i: usize) -> Vec<u8> {
    (0..(i * 37) % 300).map(|b| (b * 7 + i) as u8).collect()
}

/// Store `count` files, each on its current owner
fn seed(ring: &SimRing, count: usize) -> BTreeMap<String, Vec<u8>> {
    let order = ring.ring_order();
    (0..count)
        .map(|i| {
            let name = format!("file-{i:02}.dat");
            let data = payload(i);
            ring.put_file(&owner(&order, hash_key(&name)).ip, &name, &data);
            (name, data)
        })
        .collect()
}

/// Names of seeded files `host` should hold under the current topology
fn owned_by(ring: &SimRing, files: &BTreeMap<String, Vec<u8>>, host: &str) -> Vec<String> {
    let order = ring.ring_order();
    files
        .keys()
        .filter(|name| owner(&order, hash_key(name)).ip == host)
        .cloned()
        .collect()
}

fn assert_contents(ring: &SimRing, host: &str, files: &BTreeMap<String, Vec<u8>>) {
    for name in ring.stored(host) {
        let stored = std::fs::read(ring.store_dir(host).join(&name)).unwrap();
        assert_eq!(&stored, &files[&name], "{name} on {host}");
    }
}

#[tokio::test]
async fn test_join_pulls_exactly_owned_files() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000_000_000);
    ring.add_node("10.0.0.3", 3_000_000_000);
    let files = seed(&ring, 30);

    ring.add_node("10.0.0.2", 2_000_000_000);
    let expected = owned_by(&ring, &files, "10.0.0.2");
    let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.successor.ip, "10.0.0.3");
    assert_eq!(report.selected, expected);
    assert_eq!(report.listed, ring.stored("10.0.0.3").len());
    assert_eq!(report.skipped, report.listed - expected.len());
    assert_eq!(ring.stored("10.0.0.2"), expected);
    assert_contents(&ring, "10.0.0.2", &files);
    assert!(ring.work_leftovers("10.0.0.2").is_empty());
}

#[tokio::test]
async fn test_join_below_every_node_wraps() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 2_000_000_000);
    ring.add_node("10.0.0.3", 3_000_000_000);
    let files = seed(&ring, 30);

    ring.add_node("10.0.0.9", 1_000_000_000);
    let report = ring.coordinator("10.0.0.9").run("10.0.0.9").await.unwrap();

    // Predecessor is the highest node, so the interval passes through zero
    assert!(report.interval.wraps());
    assert_eq!(report.interval.predecessor, RingKey(3_000_000_000));
    assert_eq!(report.successor.ip, "10.0.0.1");
    assert_eq!(ring.stored("10.0.0.9"), owned_by(&ring, &files, "10.0.0.9"));
    for name in ring.stored("10.0.0.9") {
        let key = hash_key(&name).get();
        assert!(key > 3_000_000_000 || key <= 1_000_000_000, "{name} -> {key}");
    }
    assert_contents(&ring, "10.0.0.9", &files);
}

#[tokio::test]
async fn test_second_node_takes_its_half_from_the_first() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_500_000_000);
    let files = seed(&ring, 20);
    assert_eq!(ring.stored("10.0.0.1").len(), 20);

    ring.add_node("10.0.0.2", 3_500_000_000);
    let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    // The lone existing node is both predecessor and successor
    assert_eq!(report.successor.ip, "10.0.0.1");
    assert_eq!(report.interval.predecessor, RingKey(1_500_000_000));
    assert_eq!(report.listed, 20);
    assert_eq!(ring.stored("10.0.0.2"), owned_by(&ring, &files, "10.0.0.2"));
}

#[tokio::test]
async fn test_lone_node_has_nothing_to_migrate() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 42);
    ring.put_file("10.0.0.1", "solo.txt", b"alone");

    let report = ring.coordinator("10.0.0.1").run("10.0.0.1").await.unwrap();

    assert_eq!(report.successor.id, report.new_node.id);
    assert!(report.selected.is_empty());
    assert_eq!(ring.listing().calls(), 0);
}

#[tokio::test]
async fn test_empty_successor_is_noop() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000);
    ring.add_node("10.0.0.2", 2_000);

    let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    assert_eq!(report.listed, 0);
    assert!(report.migrated.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(ring.listing().calls(), 1);
}

#[tokio::test]
async fn test_unreachable_node_aborts_before_listing() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000);

    let err = ring.coordinator("10.0.0.1").run("10.9.9.9").await.unwrap_err();

    assert!(matches!(err, NodeError::PeerUnreachable(_)), "{err}");
    assert!(err.is_transient());
    assert_eq!(ring.listing().calls(), 0);
    assert!(ring.transport().downloads().is_empty());
}

#[tokio::test]
async fn test_unset_predecessor_aborts() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000);
    ring.add_node("10.0.0.2", 2_000);
    ring.forget_predecessor("10.0.0.2");

    let err = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap_err();

    assert!(matches!(err, NodeError::InvalidState(_)), "{err}");
    assert_eq!(ring.listing().calls(), 0);
}

#[tokio::test]
async fn test_failed_chunk_skips_only_that_file() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000_000_000);
    ring.add_node("10.0.0.3", 3_000_000_000);
    let files = seed(&ring, 30);
    ring.add_node("10.0.0.2", 2_000_000_000);

    let expected = owned_by(&ring, &files, "10.0.0.2");
    let victim = expected
        .iter()
        .find(|name| files[*name].len() > CHUNK_SIZE)
        .expect("a multi-chunk file in the new node's range")
        .clone();
    ring.transport().fail_chunk(&format!("{victim}.chunk1"));

    let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, victim);
    assert!(report.failed[0].error.is_transient());
    assert_eq!(report.migrated.len(), expected.len() - 1);

    let stored = ring.stored("10.0.0.2");
    assert!(!stored.contains(&victim));
    assert_eq!(stored.len(), expected.len() - 1);
    assert!(ring.work_leftovers("10.0.0.2").is_empty());

    // The victim's chunks were requested in order and stopped at the failure
    let victim_downloads: Vec<String> = ring
        .transport()
        .downloads()
        .into_iter()
        .filter(|c| c.starts_with(&format!("{victim}.chunk")))
        .collect();
    assert_eq!(
        victim_downloads,
        vec![format!("{victim}.chunk0"), format!("{victim}.chunk1")]
    );
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000_000_000);
    ring.add_node("10.0.0.3", 3_000_000_000);
    let files = seed(&ring, 20);
    ring.add_node("10.0.0.2", 2_000_000_000);

    let first = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();
    let second = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    assert!(first.is_clean() && second.is_clean());
    assert_eq!(first.selected, second.selected);
    assert_eq!(ring.stored("10.0.0.2"), owned_by(&ring, &files, "10.0.0.2"));
    assert_contents(&ring, "10.0.0.2", &files);
}

#[tokio::test]
async fn test_successive_joins_keep_every_owner_supplied() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 500_000_000);
    let files = seed(&ring, 40);

    for (host, id) in [
        ("10.0.0.2", 1_500_000_000),
        ("10.0.0.3", 2_500_000_000),
        ("10.0.0.4", 4_000_000_000),
    ] {
        ring.add_node(host, id);
        let report = ring.coordinator(host).run(host).await.unwrap();
        assert!(report.is_clean(), "join of {host}");
    }

    for node in ring.ring_order() {
        let stored = ring.stored(&node.ip);
        for name in owned_by(&ring, &files, &node.ip) {
            assert!(stored.contains(&name), "{name} missing on {}", node.ip);
        }
        assert_contents(&ring, &node.ip, &files);
    }
}

#[tokio::test]
async fn test_chunk_like_names_migrate_like_any_file() {
    let mut ring = SimRing::new(CHUNK_SIZE);
    ring.add_node("10.0.0.1", 1_000_000_000);
    ring.add_node("10.0.0.3", 3_000_000_000);
    // Keys 1635587486, 1633967174 and 4146550968
    ring.put_file("10.0.0.3", "backup.chunk2", &payload(9));
    ring.put_file("10.0.0.3", "f.partial", &payload(4));
    ring.put_file("10.0.0.3", "draft.partial", &payload(2));

    ring.add_node("10.0.0.2", 2_000_000_000);
    let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.listed, 3);
    assert_eq!(report.selected, vec!["backup.chunk2", "f.partial"]);
    assert_eq!(ring.stored("10.0.0.2"), vec!["backup.chunk2", "f.partial"]);
    assert_eq!(
        std::fs::read(ring.store_dir("10.0.0.2").join("backup.chunk2")).unwrap(),
        payload(9)
    );
    assert!(ring.work_leftovers("10.0.0.2").is_empty());
}
