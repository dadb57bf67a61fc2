pub mod store;
pub mod types;

pub use store::{BaselineStore, FsBaselineStore, sanitize_route};
pub use types::{BaselineManifest, BaselineRecord, Viewport};
