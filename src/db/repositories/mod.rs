pub mod alerts;
pub mod datasets;
pub mod history;
pub mod subjects;
