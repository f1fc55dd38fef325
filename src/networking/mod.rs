#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: the gossip transport and the node's persistent libp2p
//! identity.

pub mod gossip;
pub mod p2p_identity;
