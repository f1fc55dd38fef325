#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Core protocol primitives: identity, the record model, the persistent
//! log, and the subsystems that turn a stream of records into task
//! lifecycles, escrow settlement, reputation, and governance.

pub mod agent;
pub mod clock;
pub mod escrow;
pub mod governance;
pub mod identity;
pub mod ingress;
pub mod moderation;
pub mod record;
pub mod record_types;
pub mod reputation;
pub mod safety;
pub mod store;
pub mod task;
pub mod verify;
