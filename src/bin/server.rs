use ring_kv_store::api::{start_server, ServerConfig};
use ring_kv_store::cluster::{ClientPool, ReplicationCoordinator, Topology};
use ring_kv_store::core::LsmEngine;
use ring_kv_store::infra::LsmConfig;

use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("╔═══════════════════════════════════════════════════════╗");
    println!("║         ring-kv-store node                            ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    let lsm_config = LsmConfig::from_env();
    let server_config = ServerConfig::from_env();
    server_config
        .validate()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let topology = Topology::new(server_config.topology.clone(), &server_config.self_endpoint)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "self endpoint is not a member of the configured topology",
            )
        })?;

    match lsm_config.dir_path.canonicalize() {
        Ok(abs_path) => println!("data dir: {}\n", abs_path.display()),
        Err(_) => println!("data dir: {} (will be created)\n", lsm_config.dir_path.display()),
    }

    let engine = Arc::new(LsmEngine::new(lsm_config).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?);

    let client_pool = ClientPool::new(server_config.replica_timeout);
    let coordinator = Arc::new(ReplicationCoordinator::new(
        topology,
        Arc::clone(&engine),
        client_pool,
        server_config.worker_pool_size,
        server_config.read_repair_pool_size,
    ));

    println!(
        "starting at {}:{}, {} node(s) in topology, default ack/from = {}/{}\n",
        server_config.host,
        server_config.port,
        server_config.topology.len(),
        server_config.default_ack,
        server_config.default_from
    );

    start_server(engine, coordinator, &server_config).await
}
