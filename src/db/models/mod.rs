pub mod alert;
pub mod dataset;
pub mod history;
pub mod measurement;
pub mod subject;

pub use alert::Alert;
pub use dataset::{CatalogEntry, CatalogSyncSummary, Dataset};
pub use history::{HistoryEntry, RecordedSnapshot};
pub use measurement::Measurement;
pub use subject::{PurgeSummary, Subject, SubjectId};
