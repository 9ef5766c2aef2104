//! Everything that can go wrong, from grammar loading to the request loop.

use std::path::PathBuf;
use thiserror::Error;

/// A grammar file could not be read or was not valid grammar JSON.
///
/// Carries the offending file so that sessions loading several grammar files
/// can point at the right one.
#[derive(Debug, Error)]
pub struct ParsingError {
    file: PathBuf,
    reason: String,
}

impl ParsingError {
    pub(crate) fn new<P: Into<PathBuf>, S: Into<String>>(file: P, reason: S) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not load grammar file {}: {}",
            self.file.display(),
            self.reason
        )
    }
}

/// The loaded rules do not form a usable grammar.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// No rule expands the symbol generation is supposed to start from.
    #[error("no rule defines the start symbol '{0}'")]
    MissingStartSymbol(String),

    /// Strict validation found a `<name>` token that no rule defines.
    #[error("'{0}' is used in an expansion but has no rule of its own")]
    MissingNonTerminal(String),
}

/// A ConfigError means that a fuzzing session was configured with invalid options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Target URL is required")]
    MissingTarget,

    #[error("Concurrency must be between 1 and 100, got {0}")]
    InvalidConcurrency(u32),

    #[error("Number of requests must be greater than 0")]
    InvalidNumRequests,

    #[error("Timeout must be at least 1 second")]
    InvalidTimeout,

    #[error("Max depth must be greater than 0")]
    InvalidMaxDepth,

    #[error("Min mutations ({0}) must not exceed max mutations ({1})")]
    InvalidMutationBounds(u32, u32),
}

/// The error type for everything that can go wrong during a fuzzing session.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    /// A seed or generated input could not be used to build a request.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The request could not be completed. Inside the fuzzing loop these are
    /// recorded and skipped, never fatal.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
