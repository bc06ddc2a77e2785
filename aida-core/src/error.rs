use serde::{Deserialize, Serialize};
use std::fmt;

/// Call-scoped failure classes. Definition-time problems are reported through
/// [`DefinitionError`] instead and never travel over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Field kind or count mismatch between writer and reader.
    Framing,
    /// Unknown operation digest or unresolved target object.
    Dispatch,
    /// Failure reported by the peer in an error frame.
    Remote,
    /// Two-way call exceeded its deadline.
    Timeout,
    /// Connection went away while the call was pending.
    Closed,
    /// Handler or runtime failure on this side.
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Framing => "framing",
            ErrorCode::Dispatch => "dispatch",
            ErrorCode::Remote => "remote",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Closed => "closed",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    /// Error domain as carried by an error frame. Only set for
    /// [`ErrorCode::Remote`] failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            domain: None,
        }
    }

    pub fn framing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Framing, message)
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Dispatch, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Closed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Failure reported by the peer through an error frame.
    pub fn remote(domain: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError {
            code: ErrorCode::Remote,
            message: message.into(),
            domain: Some(domain.into()),
        }
    }

    /// Domain string written into an error frame for this failure.
    pub fn wire_domain(&self) -> &str {
        match &self.domain {
            Some(domain) => domain,
            None => self.code.as_str(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{:?} [{}]: {}", self.code, domain, self.message),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RpcError {}

/// Errors raised while building or resolving the type model. These abort
/// compilation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error("duplicate definition of '{name}' in namespace '{namespace}'")]
    Duplicate { namespace: String, name: String },

    #[error("unresolved reference: '{0}'")]
    Unresolved(String),

    #[error("type '{0}' was declared but never defined")]
    Undefined(String),

    #[error("type '{name}' is not a {expected}")]
    WrongKind { name: String, expected: &'static str },

    #[error("cyclic interface prerequisites: {0}")]
    Cycle(String),

    #[error("duplicate ordinal {ordinal} in enum '{enum_name}' (value '{ident}')")]
    DuplicateOrdinal {
        enum_name: String,
        ident: String,
        ordinal: i64,
    },

    #[error("duplicate member '{member}' in '{owner}'")]
    DuplicateMember { owner: String, member: String },

    #[error("invalid auxiliary key '{key}' for {kind}")]
    InvalidAuxKey { key: String, kind: &'static str },

    #[error("invalid type definition: {kind} takes no auxiliary data")]
    NoAuxData { kind: &'static str },

    #[error("too many auxiliary arguments for {kind}: {given} given, {max} allowed")]
    TooManyAuxArgs {
        kind: &'static str,
        given: usize,
        max: usize,
    },

    #[error("digest collision between '{first}' and '{second}' ({digest})")]
    DigestCollision {
        first: String,
        second: String,
        digest: String,
    },
}
