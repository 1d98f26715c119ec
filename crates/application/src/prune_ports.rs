mod archive;
mod directory;
mod log_source;

pub use archive::DashboardArchive;
pub use directory::DashboardDirectory;
pub use log_source::{LogPageSource, LogRangePageRequest};
