pub mod loaders;
pub mod profile;
pub mod report;
pub mod site;

pub use loaders::{load_profile, load_sites};
pub use profile::ProfileData;
pub use report::{ProgressEvent, SequenceRun, SequenceStatus, Stage, StepResult};
pub use site::Site;
