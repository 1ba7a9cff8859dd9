// Concurrent image ingestion: size policy, per-size rendering, per-file
// processing, request orchestration and result aggregation.

pub mod aggregate;
pub mod error;
pub mod image_codec;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod process;
pub mod render;
pub mod size;
pub mod storage;

pub use error::RequestError;
pub use orchestrator::Orchestrator;
pub use process::Pipeline;
