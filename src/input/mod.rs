pub mod converter;
pub mod options;
pub mod preparer;

pub use converter::{CommandConverter, GpkgConverter};
pub use options::{apply_date_overrides, parse_date, parse_time, patch_options, DateTimeOverrides};
pub use preparer::{InputKind, InputPlan, InputPreparer, PreparedInput, RunPaths, RunRequest};
