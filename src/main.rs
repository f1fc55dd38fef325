#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! rird node entrypoint (systemd-friendly). Loads configuration and
//! identity, opens the persistent log, starts the gossip transport and
//! ingress pipeline, serves `/metrics`, and runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use rird::config;
use rird::core::clock::SystemClock;
use rird::core::governance::{Governance, KeyholderRegistry};
use rird::core::ingress::IngressPipeline;
use rird::core::moderation::RateLimiter;
use rird::core::store::PersistentLog;
use rird::monitoring::{metrics::Metrics, server as metrics_server};
use rird::networking::gossip::{self, GossipConfig};
use rird::rpc::{server as rpc_server, service::RpcService};
use tokio::sync::watch;
use tracing::{info, warn};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let config_path = PathBuf::from(env("RIRD_CONFIG", "./rird.toml"));
    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    let identity_path = PathBuf::from(&cfg.identity.keypair_path);
    let keypair = match rird::core::identity::load_or_create(&identity_path) {
        Ok(kp) => kp,
        Err(e) => {
            eprintln!("failed to load or create identity at {}: {e}", identity_path.display());
            std::process::exit(1);
        }
    };
    info!(agent = %keypair.public_hex(), "node identity loaded");
    let keypair = Arc::new(keypair);

    let metrics = Arc::new(Metrics::new().expect("metrics registration failed"));

    let store = match PersistentLog::open(&cfg.store.path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("failed to open persistent log at {}: {e}", cfg.store.path);
            std::process::exit(1);
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let governance = if !cfg.governance.keyholders.is_empty() {
        let registry = KeyholderRegistry::new(cfg.governance.keyholders.clone(), cfg.governance.threshold);
        match registry {
            Ok(registry) => {
                let mut root = [0u8; 32];
                if let Ok(bytes) = hex::decode(&cfg.governance.killswitch_root) {
                    if bytes.len() == 32 {
                        root.copy_from_slice(&bytes);
                    }
                }
                let gov = Arc::new(Governance::new(registry, root));
                let shutdown_tx_for_killswitch = shutdown_tx.clone();
                let metrics_for_killswitch = metrics.clone();
                gov.register_shutdown_handler(move || {
                    metrics_for_killswitch.killswitch_invoked_total.inc();
                    let _ = shutdown_tx_for_killswitch.send(true);
                });
                Some(gov)
            }
            Err(e) => {
                warn!(?e, "invalid governance configuration; running without governance gating");
                None
            }
        }
    } else {
        None
    };

    let clock: Arc<dyn rird::core::clock::Clock> = Arc::new(SystemClock);
    let mut pipeline = IngressPipeline::new(store.clone(), clock.clone()).with_rate_limiter(rate_limiter.clone());
    if let Some(gov) = governance.clone() {
        pipeline = pipeline.with_governance(gov);
    }
    let pipeline = Arc::new(pipeline);

    let gossip_cfg = GossipConfig {
        listen_addr: cfg.gossip.listen_addr.clone(),
        topic: cfg.gossip.topic.clone(),
        bootstrap: cfg.gossip.bootstrap.clone(),
        data_dir: cfg.store.path.clone(),
        seen_cache_capacity: cfg.gossip.seen_cache_capacity,
        seen_cache_ttl_secs: cfg.gossip.seen_cache_ttl_secs,
    };
    let (mut gossip_node, mut gossip_events, gossip_handle) = match gossip::spawn_gossip(gossip_cfg) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("gossip transport failed to start: {e}");
            std::process::exit(1);
        }
    };

    let rpc_service = Arc::new(RpcService::new(
        store.clone(),
        pipeline.clone(),
        keypair.clone(),
        clock.clone(),
        Some(gossip_node.broadcaster()),
        shutdown_tx.clone(),
    ));
    let rpc_task = {
        let socket_path = cfg.rpc.socket_path.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = rpc_server::serve(socket_path, rpc_service, shutdown_rx).await {
                warn!(?e, "control-plane RPC server exited with an error");
            }
        })
    };

    let ingest_task = {
        let pipeline = pipeline.clone();
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            use rird::core::ingress::Outcome;
            loop {
                tokio::select! {
                    maybe_record = gossip_node.recv() => {
                        let Some(record) = maybe_record else { break; };
                        metrics.ingress_processed_total.inc();
                        match pipeline.submit(&record, rird::core::ingress::Channel::Public) {
                            Outcome::Accepted(_) => metrics.ingress_accepted_total.inc(),
                            Outcome::Duplicate(_) => metrics.ingress_duplicate_total.inc(),
                            Outcome::Rejected(reason) => {
                                metrics.ingress_rejected_total.inc();
                                match reason {
                                    rird::core::ingress::RejectReason::InvalidSignature => {
                                        metrics.ingress_invalid_signature_total.inc();
                                    }
                                    rird::core::ingress::RejectReason::TimestampDrift => {
                                        metrics.ingress_timestamp_drift_total.inc();
                                    }
                                    rird::core::ingress::RejectReason::RateLimited => {
                                        metrics.rate_limited_total.inc();
                                    }
                                    _ => {}
                                }
                            }
                        }
                        metrics.gossip_seen_cache_size.set(gossip_node.seen_cache().len() as i64);
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    };

    let events_task = {
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ev = gossip_events.recv() => {
                        match ev {
                            Some(ev) => {
                                match &ev {
                                    rird::networking::gossip::GossipEvent::PeerConnected(_) => {
                                        metrics.gossip_peers.inc();
                                    }
                                    rird::networking::gossip::GossipEvent::PeerDisconnected(_) => {
                                        metrics.gossip_peers.dec();
                                    }
                                }
                                info!(?ev, "gossip event");
                            }
                            None => break,
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    };

    let metrics_addr = cfg.metrics.listen_addr.parse().unwrap_or_else(|_| {
        warn!(addr = %cfg.metrics.listen_addr, "invalid metrics listen address; falling back to 127.0.0.1:9898");
        "127.0.0.1:9898".parse().unwrap()
    });
    let metrics_shutdown_rx = shutdown_rx.clone();
    let metrics_task = tokio::spawn(metrics_server::serve(metrics_addr, metrics.clone(), async move {
        let mut rx = metrics_shutdown_rx;
        let _ = rx.changed().await;
    }));

    info!("rird node started");

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(ingest_task, events_task, metrics_task, rpc_task, gossip_handle);
    let _ = store.close();
}
