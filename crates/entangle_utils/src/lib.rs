pub mod errors;
pub mod logger;
pub mod profiler;
pub mod suggest;
