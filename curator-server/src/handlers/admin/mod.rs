//! Administrative endpoints under `/api/admin/content-validation`.

pub mod archived;
pub mod monitoring;
pub mod validation_runs;
