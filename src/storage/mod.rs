//! Local storage: one category's files under one namespace root

pub mod archive;
pub mod local;
pub mod serve;

pub use archive::{collect_files, ArchiveBuilder, BuiltinTar, ExternalTar};
pub use local::LocalStore;
pub use serve::{render_listing, report_failure, report_read_failure};
