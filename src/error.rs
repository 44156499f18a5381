//! Error types for the catalog, completion and speech components.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading the product table. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("catalog {0} has no header row")]
    EmptyHeader(PathBuf),

    #[error("catalog is missing identifier column '{0}'")]
    MissingIdColumn(String),

    #[error("duplicate product id '{id}' on rows {first} and {second}")]
    DuplicateId {
        id: String,
        first: usize,
        second: usize,
    },
}

/// Failures talking to the chat-completion endpoint.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key: set openai.api_key or the {0} environment variable")]
    MissingApiKey(String),

    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("completion response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("completion response contained no choices")]
    NoChoices,
}

/// Failures rendering or playing synthesized speech.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech endpoint returned {0}")]
    Status(reqwest::StatusCode),

    #[error("nothing to speak")]
    NothingToSpeak,

    #[error("speech endpoint returned no audio")]
    EmptyAudio,

    #[error("failed to write audio to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playback failed: {0}")]
    Playback(String),
}

/// A recoverable failure of one conversation turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Speech(#[from] SpeechError),
}
