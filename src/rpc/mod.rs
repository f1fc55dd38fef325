#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Local RPC control plane (section 6 of the protocol spec): a
//! line-delimited JSON-RPC 2.0 server over a Unix domain socket,
//! serviced by this node directly rather than by an external process.

pub mod protocol;
pub mod server;
pub mod service;
