pub mod batch_processor;
pub mod run_registry;

pub use batch_processor::App;
pub use run_registry::{batch_fingerprint, RunRegistry};
