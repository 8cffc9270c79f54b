// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The factory's error type and its per-element construction report.

use std::fmt;

/// Everything that can go wrong while loading and building a topology,
/// tagged with the phase it happened in so a caller can tell a malformed
/// file from a dangling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The JSON itself didn't parse, or didn't match the expected schema.
    Parse(String),
    /// An `include` directive formed a cycle back to a file already being
    /// expanded.
    IncludeCycle(String),
    /// A module or group referenced a type name with no registered
    /// constructor.
    UnknownType(String),
    /// A `regex:` endpoint pattern failed to compile.
    BadRegex(String),
    /// An endpoint string (`instance.port`, a wildcard, or a group
    /// reference) could not be resolved against the instantiated modules.
    UnresolvedEndpoint(String),
    /// A composite module's alias table named an internal path that
    /// doesn't exist once its children are instantiated.
    BadAlias(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "parse error: {msg}"),
            ConfigError::IncludeCycle(path) => write!(f, "include cycle detected at: {path}"),
            ConfigError::UnknownType(name) => write!(f, "unknown module type: {name}"),
            ConfigError::BadRegex(pattern) => write!(f, "invalid regex pattern: {pattern}"),
            ConfigError::UnresolvedEndpoint(spec) => {
                write!(f, "could not resolve endpoint: {spec}")
            }
            ConfigError::BadAlias(path) => write!(f, "composite alias has no target: {path}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<regex::Error> for ConfigError {
    fn from(e: regex::Error) -> Self {
        ConfigError::BadRegex(e.to_string())
    }
}

/// The outcome of building a single config element (a module instance or a
/// connection), kept so the factory can report a complete per-element
/// status list rather than aborting at the first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementReport {
    pub element: String,
    pub result: Result<(), ConfigError>,
}

impl ElementReport {
    #[must_use]
    pub fn ok(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            result: Ok(()),
        }
    }

    #[must_use]
    pub fn failed(element: impl Into<String>, err: ConfigError) -> Self {
        Self {
            element: element.into(),
            result: Err(err),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
