pub mod locator;
pub mod process;

pub use locator::{version_key, ExecutableLocator};
pub use process::SwmmProcess;
