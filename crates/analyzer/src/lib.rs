pub mod analyzer;
pub mod error;
pub mod export;
pub mod report;

pub use analyzer::Analyzer;
pub use error::{AnalyzerError, Result};
pub use export::{ReportFormat, write_report};
pub use report::{Recommendation, Report};
