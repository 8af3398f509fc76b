pub mod baseline;
pub mod bins;
pub mod config;
pub mod deblink;
pub mod error;
pub mod filters;
pub mod gazedata;
pub mod mmap_utils;
pub mod pipeline;
pub mod profiling;
pub mod render;
pub mod resample;
pub mod segment;
pub mod timefmt;
pub mod types;

pub use config::{Task, TaskConfig};
pub use error::{PupilError, Result, TrialError};
pub use pipeline::process_session;
pub use render::PlotRequest;
pub use types::*;
