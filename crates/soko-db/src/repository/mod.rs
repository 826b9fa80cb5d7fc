//! # Repository Module
//!
//! Repositories over the device-local store.
//!
//! ```text
//!   KvRepository              get / put / remove / update(key, f)
//!        ▲            ▲
//!        │            │
//!   PendingQueueRepository    StockRepository    SyncLeaseRepository
//!   "pending_transactions"    "stock_levels"     "sync_lease"
//! ```
//!
//! - [`kv::KvRepository`] - Raw JSON documents with atomic read-modify-write
//! - [`pending::PendingQueueRepository`] - Offline transaction queue
//! - [`stock::StockRepository`] - Local stock mirror
//! - [`lease::SyncLeaseRepository`] - Store-wide resync lock

pub mod kv;
pub mod lease;
pub mod pending;
pub mod stock;
