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

//! rird - a peer-to-peer daemon for a marketplace of autonomous agents.
//!
//! This crate provides:
//! - Content-addressed, Ed25519-signed activity records with canonical
//!   encoding, and a persistent, indexed append-only log to hold them
//! - An ingress pipeline gating every inbound record on shape, dedup,
//!   clock drift, signature, rate limits, and governance standing
//! - A hardcoded safety filter, task lifecycle state machine, trust-
//!   tiered escrow engine, bidder/executor, tiered verifier, reputation
//!   scoring, and N-of-M governance with an emergency killswitch
//! - A libp2p gossipsub transport carrying public records, with direct
//!   peer streams for private negotiation and escrow coordination

/// Node configuration (TOML + environment overrides).
pub mod config;
/// Core protocol primitives: identity, records, the persistent log, and
/// every downstream subsystem that reacts to them.
pub mod core;
/// Observability: Prometheus metrics and the `/metrics` HTTP endpoint.
pub mod monitoring;
/// P2P networking stack: the gossip transport and persistent identity.
pub mod networking;
/// Local RPC control plane: line-delimited JSON-RPC over a Unix socket.
pub mod rpc;
