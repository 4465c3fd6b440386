use thiserror::Error;

/// Error taxonomy shared by both backends. Message strings are intentionally
/// not Redis-exact; the kind is the contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedisError {
    #[error("operation against a key holding the wrong kind of value")]
    TypeMismatch,
    #[error("value is not an integer or out of range")]
    NotInteger,
    #[error("value is not a valid float")]
    NotFloat,
    #[error("wrong number of arguments for '{0}'")]
    Arity(String),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Script(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("command '{0}' is not supported on this backend")]
    NotImplemented(String),
}

impl RedisError {
    /// Wraps an arbitrary message as a script-originated error.
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Wraps an arbitrary message as a registration-time error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
