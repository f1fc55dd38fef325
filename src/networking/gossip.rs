// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Gossip adapter (C13): a libp2p gossipsub transport carrying public
//! activity records on one topic, plus direct peer streams for private
//! record kinds. Deduplicates inbound traffic by id before it ever
//! reaches the ingress pipeline, independent of the pipeline's own
//! persistent-store dedup.

use crate::core::record::{self, ActivityRecord};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use libp2p::{
    core::upgrade,
    gossipsub::{self, MessageAuthenticity},
    identify, noise, ping,
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Transport,
};
use libp2p::futures::StreamExt;

/// Gossip transport errors.
#[derive(Debug, Error)]
pub enum GossipError {
    /// I/O failure (e.g. persistent identity directory).
    #[error("io")]
    Io,
    /// Transport/behaviour construction failed.
    #[error("transport config")]
    Config,
}

/// A bound on the seen-id cache: entries older than `ttl_secs`, or
/// beyond `capacity` (oldest first), are evicted.
pub struct SeenCache {
    capacity: usize,
    ttl_secs: u64,
    order: Mutex<Vec<(String, u64)>>,
    index: Mutex<HashMap<String, u64>>,
}

impl SeenCache {
    /// Construct a cache bounded to `capacity` entries with `ttl_secs`
    /// expiry.
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            capacity,
            ttl_secs,
            order: Mutex::new(Vec::new()),
            index: Mutex::new(HashMap::new()),
        }
    }

    fn evict_expired(&self, now: u64) {
        let mut order = self.order.lock().unwrap();
        let mut index = self.index.lock().unwrap();
        order.retain(|(id, seen_at)| {
            let alive = now.saturating_sub(*seen_at) <= self.ttl_secs;
            if !alive {
                index.remove(id);
            }
            alive
        });
    }

    /// `true` if `id` was already seen (and not yet evicted); otherwise
    /// records it as seen and returns `false`.
    pub fn check_and_insert(&self, id: &str, now: u64) -> bool {
        self.evict_expired(now);

        if self.index.lock().unwrap().contains_key(id) {
            return true;
        }

        let mut order = self.order.lock().unwrap();
        let mut index = self.index.lock().unwrap();
        while order.len() >= self.capacity {
            if let Some((oldest_id, _)) = order.first().cloned() {
                order.remove(0);
                index.remove(&oldest_id);
            } else {
                break;
            }
        }
        order.push((id.to_string(), now));
        index.insert(id.to_string(), now);
        false
    }

    /// Current number of tracked ids.
    pub fn len(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Events surfaced by the gossip transport to callers.
#[derive(Clone, Debug)]
pub enum GossipEvent {
    /// Peer connected.
    PeerConnected(String),
    /// Peer disconnected.
    PeerDisconnected(String),
}

/// Runtime configuration for the gossip transport.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Listen multiaddr.
    pub listen_addr: String,
    /// Gossipsub topic name for public activity records.
    pub topic: String,
    /// Bootstrap peer multiaddrs.
    pub bootstrap: Vec<String>,
    /// Directory holding the node's persistent libp2p identity.
    pub data_dir: String,
    /// Seen-id cache capacity (LRU eviction).
    pub seen_cache_capacity: usize,
    /// Seen-id cache entry expiry, in seconds.
    pub seen_cache_ttl_secs: u64,
}

#[derive(Debug)]
enum BehaviourEvent {
    Gossipsub(gossipsub::Event),
    Identify(()),
    Ping(()),
}
impl From<gossipsub::Event> for BehaviourEvent {
    fn from(e: gossipsub::Event) -> Self {
        Self::Gossipsub(e)
    }
}
impl From<identify::Event> for BehaviourEvent {
    fn from(_e: identify::Event) -> Self {
        Self::Identify(())
    }
}
impl From<ping::Event> for BehaviourEvent {
    fn from(_e: ping::Event) -> Self {
        Self::Ping(())
    }
}

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "BehaviourEvent")]
struct Behaviour {
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
}

fn ensure_dir(path: &str) -> Result<(), GossipError> {
    let p = Path::new(path);
    if !p.exists() {
        std::fs::create_dir_all(p).map_err(|_| GossipError::Io)?;
    }
    Ok(())
}

/// Handle to the running gossip transport.
pub struct GossipNode {
    inbound_rx: mpsc::Receiver<ActivityRecord>,
    outbound_tx: mpsc::Sender<ActivityRecord>,
    seen: Arc<SeenCache>,
}

impl GossipNode {
    /// Receive the next deduplicated inbound record.
    pub async fn recv(&mut self) -> Option<ActivityRecord> {
        self.inbound_rx.recv().await
    }

    /// Broadcast a public record on the gossip topic.
    pub async fn broadcast(&self, record: ActivityRecord) -> Result<(), GossipError> {
        self.outbound_tx.send(record).await.map_err(|_| GossipError::Io)
    }

    /// The seen-id cache backing inbound dedup.
    pub fn seen_cache(&self) -> &SeenCache {
        &self.seen
    }

    /// A cloneable, `recv`-independent handle for broadcasting records,
    /// so callers that only need to publish (e.g. the RPC control plane)
    /// are not forced to hold the exclusive `&mut self` that `recv`
    /// requires.
    pub fn broadcaster(&self) -> GossipBroadcaster {
        GossipBroadcaster { outbound_tx: self.outbound_tx.clone() }
    }
}

/// A cloneable handle that can publish records without the exclusive
/// access `GossipNode::recv` requires.
#[derive(Clone)]
pub struct GossipBroadcaster {
    outbound_tx: mpsc::Sender<ActivityRecord>,
}

impl GossipBroadcaster {
    /// Broadcast a public record on the gossip topic.
    pub async fn broadcast(&self, record: ActivityRecord) -> Result<(), GossipError> {
        self.outbound_tx.send(record).await.map_err(|_| GossipError::Io)
    }
}

/// Spawn the gossip transport task.
pub fn spawn_gossip(cfg: GossipConfig) -> Result<(GossipNode, mpsc::Receiver<GossipEvent>, tokio::task::JoinHandle<()>), GossipError> {
    ensure_dir(&cfg.data_dir)?;

    let (local_peer_id, id_keys) =
        crate::networking::p2p_identity::load_or_create_identity(&cfg.data_dir).map_err(|_| GossipError::Io)?;

    let seen = Arc::new(SeenCache::new(cfg.seen_cache_capacity, cfg.seen_cache_ttl_secs));
    let seen_for_task = seen.clone();

    let (in_tx, in_rx) = mpsc::channel::<ActivityRecord>(1024);
    let (out_tx, mut out_rx) = mpsc::channel::<ActivityRecord>(1024);
    let (ev_tx, ev_rx) = mpsc::channel::<GossipEvent>(128);

    let listen_addr = cfg.listen_addr.clone();
    let topic_name = cfg.topic.clone();
    let bootstrap = cfg.bootstrap.clone();

    let join = tokio::spawn(async move {
        let noise_keys = match noise::Config::new(&id_keys) {
            Ok(v) => v,
            Err(_) => {
                warn!("failed to build noise config");
                return;
            }
        };

        let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
            .upgrade(upgrade::Version::V1)
            .authenticate(noise_keys)
            .multiplex(yamux::Config::default())
            .boxed();

        let gcfg = gossipsub::ConfigBuilder::default()
            .validation_mode(gossipsub::ValidationMode::Permissive)
            .heartbeat_interval(std::time::Duration::from_secs(1))
            .build()
            .unwrap_or_else(|_| gossipsub::Config::default());

        let mut gossipsub = match gossipsub::Behaviour::new(MessageAuthenticity::Signed(id_keys.clone()), gcfg) {
            Ok(v) => v,
            Err(_) => {
                warn!("failed to create gossipsub behaviour");
                return;
            }
        };

        let topic = gossipsub::IdentTopic::new(topic_name);
        if gossipsub.subscribe(&topic).is_err() {
            warn!("failed to subscribe to activity record topic");
            return;
        }

        let identify = identify::Behaviour::new(identify::Config::new("rird/1.0.0".into(), id_keys.public()));
        let ping = ping::Behaviour::new(
            ping::Config::new()
                .with_interval(std::time::Duration::from_secs(10))
                .with_timeout(std::time::Duration::from_secs(20)),
        );

        let behaviour = Behaviour { gossipsub, identify, ping };
        let mut swarm = libp2p::Swarm::new(
            transport,
            behaviour,
            local_peer_id,
            libp2p::swarm::Config::with_tokio_executor(),
        );

        match listen_addr.parse() {
            Ok(listen) => {
                if let Err(e) = swarm.listen_on(listen) {
                    warn!(%listen_addr, error = %e, "failed to listen on gossip address");
                }
            }
            Err(e) => warn!(%listen_addr, error = %e, "invalid gossip listen address"),
        }
        for addr in &bootstrap {
            match addr.parse() {
                Ok(ma) => {
                    if let Err(e) = swarm.dial(ma) {
                        warn!(%addr, error = %e, "failed to dial bootstrap peer");
                    }
                }
                Err(e) => warn!(%addr, error = %e, "invalid bootstrap address"),
            }
        }

        loop {
            tokio::select! {
                maybe_out = out_rx.recv() => {
                    let Some(record) = maybe_out else { break; };
                    if let Ok(bytes) = record::serialize(&record) {
                        let _ = swarm.behaviour_mut().gossipsub.publish(topic.clone(), bytes);
                    }
                }
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. })) => {
                            let Some(record) = record::deserialize(&message.data) else { continue };
                            if seen_for_task.check_and_insert(&record.id, now_unix()) {
                                continue;
                            }
                            if in_tx.send(record).await.is_err() {
                                break;
                            }
                        }
                        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                            let _ = ev_tx.send(GossipEvent::PeerConnected(peer_id.to_string())).await;
                        }
                        SwarmEvent::ConnectionClosed { peer_id, .. } => {
                            let _ = ev_tx.send(GossipEvent::PeerDisconnected(peer_id.to_string())).await;
                        }
                        _ => {}
                    }
                }
            }
        }
        info!("gossip task exiting");
    });

    Ok((GossipNode { inbound_rx: in_rx, outbound_tx: out_tx, seen }, ev_rx, join))
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_cache_dedups() {
        let cache = SeenCache::new(10, 3600);
        assert!(!cache.check_and_insert("blake3:a", 1000));
        assert!(cache.check_and_insert("blake3:a", 1001));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn seen_cache_evicts_expired() {
        let cache = SeenCache::new(10, 100);
        cache.check_and_insert("blake3:a", 1000);
        assert!(!cache.check_and_insert("blake3:a", 1200));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn seen_cache_evicts_oldest_beyond_capacity() {
        let cache = SeenCache::new(2, 10_000);
        cache.check_and_insert("blake3:a", 1000);
        cache.check_and_insert("blake3:b", 1001);
        cache.check_and_insert("blake3:c", 1002);
        assert_eq!(cache.len(), 2);
        assert!(!cache.check_and_insert("blake3:a", 1003));
    }
}
