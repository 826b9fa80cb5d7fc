//! # soko-db: Local Durable Store for Soko POS
//!
//! Everything the POS device must remember across restarts lives here:
//! the offline transaction queue and the local stock mirror.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Soko POS Data Flow                               │
//! │                                                                         │
//! │  Finalizer (queue on failed sync)      Resync pass (drain queue)       │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     soko-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ KvRepository       │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ PendingQueueRepo   │  │ 001_local_ │  │   │
//! │  │   │ write lock    │    │ StockRepository    │  │ store.sql  │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite: local_kv(key, value JSON, updated_at)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soko_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("soko.db")).await?;
//! db.pending_queue().append(entry).await?;
//! let waiting = db.pending_queue().count().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::kv::KvRepository;
pub use repository::lease::{SyncLease, SyncLeaseRepository};
pub use repository::pending::PendingQueueRepository;
pub use repository::stock::StockRepository;

/// Well-known key of the offline transaction queue.
pub const PENDING_TRANSACTIONS_KEY: &str = "pending_transactions";

/// Well-known key of the local stock mirror.
pub const STOCK_LEVELS_KEY: &str = "stock_levels";

/// Well-known key of the resync lease.
pub const SYNC_LEASE_KEY: &str = "sync_lease";
