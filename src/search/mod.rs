pub mod hybrid;
pub mod service;
pub mod snippet;

pub use hybrid::{FusedResult, RrfFuser};
pub use service::SearchService;
pub use snippet::build_snippet;
