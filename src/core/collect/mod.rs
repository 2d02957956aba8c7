// src/core/collect/mod.rs

//! The collection pipeline: node discovery, the HTTP stat fanout, metakey
//! reads, external DB ingestion, and the round orchestrator that drives one
//! collection cycle end to end.

pub mod collector;
pub mod discovery;
pub mod fanout;
pub mod metadb;
pub mod metakey;
pub mod round;

pub use collector::{Collector, CollectorHandle};
pub use discovery::{Discovery, StaticDiscovery};
pub use fanout::StatsFanout;
pub use metadb::{MetaDb, UnconfiguredMetaDb};
pub use metakey::{MetakeyClient, MetakeyReply, UnavailableMetakeyClient};
pub use round::{Round, RoundClock, RoundContext, RoundKind};
