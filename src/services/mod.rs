pub mod account_service;
pub mod progress_service;

pub use account_service::AccountSaver;
pub use progress_service::{HttpProgressSink, LogProgressSink, ProgressReporter, ProgressSink};
