use thiserror::Error;

/// Errors raised while constructing or duplicating values.
///
/// These are construction-time failures: the host evaluator is expected to
/// reject the offending program before it runs, so the runtime core treats
/// them as fatal when they surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("copyable aggregate '{type_name}' cannot hold linear field '{field}'")]
    LinearInCopyable { type_name: String, field: String },

    #[error("cannot copy linear value of type '{type_name}'")]
    CopyOfLinear { type_name: String },

    #[error("invalid storage path '{0}'")]
    InvalidPath(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}
