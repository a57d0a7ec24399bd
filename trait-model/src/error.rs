use tree_util::TreeError;

/// Which class of failure a [`TraitModelError`] belongs to.
///
/// Malformed input and invalid configuration mean the caller should
/// reject the parameter proposal; degeneracy means the contracted
/// system was singular for otherwise valid inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedInput,
    InvalidConfig,
    Degenerate,
}

#[derive(Debug, thiserror::Error)]
pub enum TraitModelError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("numerical degeneracy: {0}")]
    Degenerate(String),

    #[error("malformed tree: {0}")]
    Tree(#[from] TreeError),
}

impl TraitModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraitModelError::MalformedInput(_) | TraitModelError::Tree(_) => {
                ErrorKind::MalformedInput
            }
            TraitModelError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            TraitModelError::Degenerate(_) => ErrorKind::Degenerate,
        }
    }
}

pub type Result<T> = std::result::Result<T, TraitModelError>;

pub(crate) fn malformed(msg: impl Into<String>) -> TraitModelError {
    TraitModelError::MalformedInput(msg.into())
}

pub(crate) fn invalid_config(msg: impl Into<String>) -> TraitModelError {
    TraitModelError::InvalidConfig(msg.into())
}

pub(crate) fn degenerate(msg: impl Into<String>) -> TraitModelError {
    TraitModelError::Degenerate(msg.into())
}
