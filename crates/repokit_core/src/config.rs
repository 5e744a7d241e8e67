//! Repository runtime configuration.
//!
//! # Responsibility
//! - Parse the application runtime mode from configuration text.
//! - Derive the diagnostic behavior injected into repositories.
//!
//! # Invariants
//! - Nothing here reads process environment; callers pass values in.
//! - Only `RuntimeMode::Local` can enable `DiagnosticMode::DumpAndHalt`.

use std::fmt::{Display, Formatter};

/// Deployment mode of the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    Local,
    Testing,
    Staging,
    #[default]
    Production,
}

impl RuntimeMode {
    /// Parses a mode name, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Self::Local),
            "testing" | "test" => Ok(Self::Testing),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unsupported runtime mode `{other}`; expected local|testing|staging|production"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Testing => "testing",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl Display for RuntimeMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a repository does with a failed operation besides returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticMode {
    /// Emit one error log entry.
    #[default]
    Log,
    /// Panic with a debug dump of the failure before anything is logged.
    DumpAndHalt,
}

/// Settings consumed by [`BaseRepository::from_config`](crate::BaseRepository::from_config).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub mode: RuntimeMode,
    /// Allows `Local` mode to halt on failures.
    pub dump_on_error: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Production,
            dump_on_error: true,
        }
    }
}

impl RepositoryConfig {
    pub fn new(mode: RuntimeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn diagnostics(&self) -> DiagnosticMode {
        if self.mode == RuntimeMode::Local && self.dump_on_error {
            DiagnosticMode::DumpAndHalt
        } else {
            DiagnosticMode::Log
        }
    }
}
