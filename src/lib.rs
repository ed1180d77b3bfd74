//! Pressure-mat monitoring core.
//!
//! Turns delimited sensor rows into 32x32 frames, derives KPIs, classifies
//! peak pressure into alert tiers, keeps a change-gated measurement history
//! and hands out pre-recorded datasets to subjects exclusively. The
//! embedding application owns the UI, accounts and the refresh timer; it
//! drives everything through [`PressureCore`].

pub mod alerts;
pub mod config;
pub mod db;
pub mod error;
pub mod frames;
pub mod history;
pub mod ingest;
pub mod pool;
pub mod replay;
pub mod subjects;
pub mod utils;

pub use alerts::{classify, requires_attention, AlertTier, Classification};
pub use config::{ConfigStore, CoreConfig};
pub use db::{
    models::{
        Alert, CatalogEntry, CatalogSyncSummary, Dataset, HistoryEntry, Measurement,
        PurgeSummary, RecordedSnapshot, Subject, SubjectId,
    },
    Database,
};
pub use error::{CoreError, CoreResult};
pub use frames::{Frame, FrameReader, KpiTriple, Kpis, ParseStats};
pub use history::{CaptureSession, HistoryRecorder};
pub use ingest::{Ingestion, PressureCore};
pub use pool::{CatalogSource, DatasetPool, DirectoryCatalog, StaticCatalog};
pub use replay::{ReplayCursor, ReplayFeed};
pub use subjects::{Registration, SubjectRegistry};
pub use utils::init_logging;
