pub mod core;
pub mod storage;
pub mod analysis;
pub mod schema;
pub mod store;
pub mod index;
pub mod scoring;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;

pub use crate::core::config::{Config, ScorerKind, SyncMode};
pub use crate::core::engine::Engine;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::lifecycle::LifecycleState;
pub use crate::core::stats::EngineStats;
pub use crate::core::types::{AttributeValue, Record, RecordId, Scalar};
pub use crate::query::ast::{BooleanOperator, Clause, FacetSpec, FieldScope, FilterSpec, Query, SortOrder};
pub use crate::schema::schema::{AnalyzerKind, FieldDefinition, FieldType, Schema};
pub use crate::search::facet::{FacetBucket, FacetKind, FacetResult};
pub use crate::search::results::{SearchHit, SearchResults};
pub use crate::storage::persistence::SaveReport;
pub use crate::writer::upsert::{UpsertLog, UpsertLogEntry, UpsertMode, UpsertStatus};

/*
┌──────────────────────────────────── VELLUM ARCHITECTURE ────────────────────────────────────┐

  struct Engine
  ├── lifecycle: Lifecycle              Initializing -> Running <-> Saving -> ShuttingDown -> Stopped
  ├── mvcc: Arc<MVCCController>         RwLock<IndexState { store, index }> + version counter
  ├── upserts: UpsertManager            analyze -> key stripe -> write lock -> WAL append -> apply
  ├── persistence: Arc<PersistenceManager>
  │     ├── FileLock                    <data>/.lock, released on shutdown
  │     ├── WAL                         <data>/wal/wal_<seq>.log
  │     └── snapshot                    <data>/snapshot/snapshot.bin (tmp + rename)
  ├── indexer: Arc<Indexer>             Record -> AnalyzedRecord (positions per segment)
  ├── parser: QueryParser               "title:gar* AND \"john smith\"~2" -> Query
  ├── scorer: Box<dyn Scorer>           BM25 | TF-IDF
  └── fuzzy: FuzzyMatcher               Levenshtein DFAs, one per distance

  Write path:  Record ─► Indexer::prepare ─► UpsertManager ─► WAL ─► RecordStore + InvertedIndex
  Read path:   Query ─► QueryValidator ─► SearchExecutor ─┬─► prefix / fuzzy term expansion
                                                           ├─► PhraseMatcher (segment isolated)
                                                           ├─► RecordFilter (typed conditions)
                                                           ├─► FacetAggregator
                                                           └─► TopKCollector / field sort
  Save:        read lock { map clone, rotate WAL } ─► bincode ─► lz4 ─► crc ─► publish

└─────────────────────────────────────────────────────────────────────────────────────────────┘
*/
