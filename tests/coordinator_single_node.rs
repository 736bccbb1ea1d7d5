use ring_kv_store::cluster::{ClientPool, CoordRequest, ReplicationCoordinator, Topology};
use ring_kv_store::core::LsmEngine;
use ring_kv_store::infra::LsmConfig;

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn single_node_coordinator(dir: &std::path::Path) -> ReplicationCoordinator {
    let engine_config = LsmConfig::builder().dir_path(dir.to_path_buf()).build().unwrap();
    let engine = Arc::new(LsmEngine::new(engine_config).unwrap());
    let topology = Topology::new(vec!["node-a:8080".to_string()], "node-a:8080").unwrap();
    let client_pool = ClientPool::new(Duration::from_millis(100));
    ReplicationCoordinator::new(topology, engine, client_pool, 8, 2)
}

#[tokio::test]
async fn put_then_get_round_trips_on_a_single_node() {
    let dir = tempdir().unwrap();
    let coordinator = single_node_coordinator(dir.path());

    let (status, _) = coordinator
        .dispatch(
            CoordRequest::Put { key: b"k1".to_vec(), value: b"hello".to_vec() },
            1,
            1,
        )
        .await
        .unwrap();
    assert_eq!(status, 201);

    let (status, body) = coordinator
        .dispatch(CoordRequest::Get { key: b"k1".to_vec() }, 1, 1)
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn delete_then_get_returns_404() {
    let dir = tempdir().unwrap();
    let coordinator = single_node_coordinator(dir.path());

    coordinator
        .dispatch(CoordRequest::Put { key: b"k2".to_vec(), value: b"v1".to_vec() }, 1, 1)
        .await
        .unwrap();
    let (status, _) = coordinator
        .dispatch(CoordRequest::Delete { key: b"k2".to_vec() }, 1, 1)
        .await
        .unwrap();
    assert_eq!(status, 202);

    let (status, _) = coordinator
        .dispatch(CoordRequest::Get { key: b"k2".to_vec() }, 1, 1)
        .await
        .unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn get_of_missing_key_returns_404() {
    let dir = tempdir().unwrap();
    let coordinator = single_node_coordinator(dir.path());

    let (status, _) = coordinator
        .dispatch(CoordRequest::Get { key: b"never-written".to_vec() }, 1, 1)
        .await
        .unwrap();
    assert_eq!(status, 404);
}
