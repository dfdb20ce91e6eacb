pub mod backend_error;
pub mod kind;

pub use backend_error::BackendError;
pub use kind::ErrorKind;

/// Raised while building a [`Step`](crate::scenario::Step) from its raw form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidStepError {
    #[error("step has no action")]
    NoAction,

    #[error("step has more than one action: {}", .0.join(", "))]
    MultipleActions(Vec<String>),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid {action} step: {reason}")]
    Malformed { action: String, reason: String },
}

impl InvalidStepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvalidStepError::UnsupportedAction(_) => ErrorKind::UnsupportedAction,
            _ => ErrorKind::InvalidStep,
        }
    }
}
