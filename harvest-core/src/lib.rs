pub mod budget;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod error;
pub mod error_utils;
pub mod flatten;
pub mod types;

pub use budget::*;
pub use cancel::CancelSignal;
pub use config::*;
pub use dataset::*;
pub use error::*;
pub use error_utils::*;
pub use flatten::flatten;
pub use types::*;
