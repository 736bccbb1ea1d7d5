use ring_kv_store::cluster::Topology;
use ring_kv_store::cluster::rendezvous::rank;

#[test]
fn every_node_computes_the_same_permutation_for_a_key() {
    let endpoints: Vec<String> = (0..5).map(|i| format!("node-{i}:8080")).collect();

    let rankings: Vec<Vec<usize>> = endpoints
        .iter()
        .map(|self_endpoint| {
            let topology = Topology::new(endpoints.clone(), self_endpoint).unwrap();
            rank(&topology, b"shared-key")
        })
        .collect();

    for window in rankings.windows(2) {
        assert_eq!(window[0], window[1]);
    }
}

#[test]
fn ranking_depends_only_on_topology_and_key_not_on_self() {
    let endpoints: Vec<String> = vec!["a:1".into(), "b:1".into(), "c:1".into()];
    let topo_a = Topology::new(endpoints.clone(), "a:1").unwrap();
    let topo_c = Topology::new(endpoints, "c:1").unwrap();

    assert_eq!(rank(&topo_a, b"x"), rank(&topo_c, b"x"));
}
