pub mod scanner;
pub mod summary;

pub use scanner::{MatchMode, ReportLine, ReportLines, ReportScan, ReportScanner};
pub use summary::RunReport;
