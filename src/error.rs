use thiserror::Error;

use crate::sys::jni::jint;
use crate::sys::jvmti::jvmtiError;

/// Errors surfaced by the agent's event handling and startup.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("GetEnv failed with {0}")]
    GetEnv(jint),

    #[error("{op} failed: {error}")]
    Jvmti { op: &'static str, error: jvmtiError },

    #[error("jvmti->Allocate({len}) failed: {error}")]
    Allocation { len: usize, error: jvmtiError },

    #[error("agent instance not found in environment local storage")]
    NoInstance,

    #[error("invalid agent options: {0}")]
    Config(#[from] ConfigError),

    #[error("rewrite refused: {0}")]
    Marker(#[from] MarkerError),
}

/// Reasons the marker encoder refuses to touch a buffer. The buffer is left
/// unmodified whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("byte range {offset}..{end} is outside the {len}-byte class buffer")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    #[error("version byte {found:#04x} is not an ASCII digit")]
    NotADigit { found: u8 },

    #[error("no marker slot left for version {version} (at most {max} rewrites fit)")]
    SlotsExhausted { version: u8, max: usize },
}

/// Problems in the `-agentpath:...=options` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown option key '{0}'")]
    UnknownKey(String),

    #[error("option '{0}' has no value")]
    MissingValue(String),

    #[error("id must be a single printable ASCII character, got '{0}'")]
    InvalidIdentity(String),

    #[error("repeat count must be an integer >= 2 that keeps the marker addressable, got '{0}'")]
    InvalidRepeat(String),

    #[error("redefine must be 'skip' or 'transform', got '{0}'")]
    InvalidRedefine(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("marker record of {record} bytes does not fit a {pattern}-byte pattern slot")]
    RecordTooWide { record: usize, pattern: usize },
}
