pub mod error;
pub mod error_mapping;
pub mod protocol;
pub mod result;
pub mod scenario;

pub use error::{BackendError, ErrorKind, InvalidStepError};
pub use result::{RecoveryMethod, RecoveryRecord, StepFailure, StepOutcome, StepResult, StepStatus};
pub use scenario::{Action, ActionKind, Scenario, Step};
