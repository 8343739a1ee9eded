//! Error kinds for the portal box controller.
//!
//! `ConfigError` and `ProfileError` are fatal: the caller propagates them
//! out of `Setup` and the FSM transitions to `Shutdown`. `BackendError`,
//! `DeviceError` and `NotifierError` are recorded (via `tracing`) and
//! dropped by their callers; they never unwind past the component that
//! raised them.

use thiserror::Error;

/// Configuration file is missing, malformed, or missing required keys.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ini::ParseError,
    },
    #[error("missing required [{section}] key '{key}'")]
    MissingKey { section: &'static str, key: &'static str },
    #[error("invalid value for [{section}] {key}: {value}")]
    InvalidValue { section: &'static str, key: &'static str, value: String },
}

/// The equipment profile could not be obtained from the backend.
#[derive(Debug, Error, Clone)]
pub enum ProfileError {
    #[error("registration check failed: {0}")]
    Registration(#[from] BackendError),
    #[error("profile fetch failed: {0}")]
    Fetch(BackendError),
    #[error("profile response was malformed: {0}")]
    Malformed(String),
}

/// Non-200 response or transport failure talking to the backend.
#[derive(Debug, Error, Clone)]
#[error("backend call '{mode}' failed: {detail}")]
pub struct BackendError {
    pub mode: &'static str,
    pub detail: String,
}

impl BackendError {
    pub fn new(mode: &'static str, detail: impl Into<String>) -> Self {
        Self { mode, detail: detail.into() }
    }
}

/// A hardware fault on an individual device effect.
#[derive(Debug, Error, Clone)]
#[error("device error ({operation}): {detail}")]
pub struct DeviceError {
    pub operation: &'static str,
    pub detail: String,
}

impl DeviceError {
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self { operation, detail: detail.into() }
    }
}

/// Failure sending a user notification.
#[derive(Debug, Error, Clone)]
#[error("notification to {recipient} failed: {detail}")]
pub struct NotifierError {
    pub recipient: String,
    pub detail: String,
}

impl NotifierError {
    pub fn new(recipient: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), detail: detail.into() }
    }
}
