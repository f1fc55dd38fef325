#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Observability: Prometheus metrics and the structured logging
//! conventions followed throughout the daemon.

pub mod metrics;
pub mod server;
