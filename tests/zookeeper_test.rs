//! Leader detection against an in-process ZooKeeper.

use std::sync::Arc;
use std::time::Duration;

use cluster_master::allocator::{self, HierarchicalDrfPolicy};
use cluster_master::detector::{
    DefaultDetectorFactory, DetectorEndpoint, DetectorFactory, MasterDetector,
};
use cluster_master::files::FileRegistry;
use cluster_master::master::{Master, MasterHandle, Pid};
use cluster_master::MasterConfig;

mod common;
use common::{eventually, MockZooKeeper};

fn start_master(addr: &str) -> (allocator::AllocatorProcess, MasterHandle) {
    let (process, allocator) = allocator::spawn(HierarchicalDrfPolicy::new());
    let master = Master::new(allocator, Arc::new(FileRegistry::new()), MasterConfig::default());
    (process, master.spawn(addr.parse::<Pid>().unwrap()))
}

#[tokio::test]
async fn test_sole_member_is_elected() {
    let zk = MockZooKeeper::default();
    let zk_addr = zk.start().await;
    let (_allocator, handle) = start_master("master@127.0.0.1:5050");
    let client = handle.client();

    let endpoint = DetectorEndpoint::parse(&format!("zk://{zk_addr}/mesos/master")).unwrap();
    let factory = DefaultDetectorFactory::new(Duration::from_secs(6));
    let detector = factory.create(&endpoint, &client, true, false).unwrap();
    assert_eq!(detector.kind(), "zookeeper");

    assert!(eventually(|| async { client.is_leading() }).await);
    assert!(zk.contains("/mesos/master/info_0000000000"));

    detector.destroy().await;
    assert!(zk.journal.entries().contains(&"close".to_string()));
    assert!(!zk.contains("/mesos/master/info_0000000000"));
}

#[tokio::test]
async fn test_existing_member_leads() {
    let zk = MockZooKeeper::default();
    zk.insert("/master/info_0000000000", b"master@10.0.0.9:5050");
    let zk_addr = zk.start().await;

    let (_allocator, handle) = start_master("master@127.0.0.1:5051");
    let client = handle.client();

    let endpoint = DetectorEndpoint::parse(&format!("zk://{zk_addr}/master")).unwrap();
    let detector = DefaultDetectorFactory::new(Duration::from_secs(6))
        .create(&endpoint, &client, true, true)
        .unwrap();

    let other: Pid = "master@10.0.0.9:5050".parse().unwrap();
    assert!(eventually(|| async { client.leader().as_ref() == Some(&other) }).await);
    assert!(!client.is_leading());
    assert!(zk.contains("/master/info_0000000001"));

    detector.destroy().await;
}

#[tokio::test]
async fn test_credentials_are_sent() {
    let zk = MockZooKeeper::default();
    let zk_addr = zk.start().await;
    let (_allocator, handle) = start_master("master@127.0.0.1:5052");
    let client = handle.client();

    let endpoint =
        DetectorEndpoint::parse(&format!("zk://operator:secret@{zk_addr}/master")).unwrap();
    let detector = DefaultDetectorFactory::new(Duration::from_secs(6))
        .create(&endpoint, &client, true, false)
        .unwrap();

    assert!(eventually(|| async { client.is_leading() }).await);
    let entries = zk.journal.entries();
    assert_eq!(&entries[..2], &["connect".to_string(), "auth".to_string()]);

    detector.destroy().await;
}

#[tokio::test]
async fn test_destroy_does_not_wait_on_stalled_ensemble() {
    let zk = MockZooKeeper::stalled();
    let zk_addr = zk.start().await;
    let (_allocator, handle) = start_master("master@127.0.0.1:5054");
    let client = handle.client();

    let endpoint =
        DetectorEndpoint::parse(&format!("zk://operator:secret@{zk_addr}/master")).unwrap();
    let detector = DefaultDetectorFactory::new(Duration::from_secs(30))
        .create(&endpoint, &client, true, false)
        .unwrap();

    let journal = zk.journal.clone();
    assert!(eventually(|| {
        let journal = journal.clone();
        async move { journal.entries().contains(&"unanswered".to_string()) }
    })
    .await);

    let destroyed = tokio::time::timeout(Duration::from_secs(2), detector.destroy()).await;
    assert!(destroyed.is_ok());
    assert!(!client.is_leading());
}

#[tokio::test]
async fn test_unreadable_endpoint_file_fails_creation() {
    let (_allocator, handle) = start_master("master@127.0.0.1:5053");
    let endpoint = DetectorEndpoint::parse("file:///definitely/not/here").unwrap();

    let result = DefaultDetectorFactory::new(Duration::from_secs(6)).create(
        &endpoint,
        &handle.client(),
        true,
        false,
    );
    assert!(result.is_err());
}
