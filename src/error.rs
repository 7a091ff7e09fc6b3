use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning landmarks into features.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("hand needs exactly 21 landmarks, found {found}")]
    InvalidHandShape { found: usize },
}

/// Errors from the sequence classifier and its artifacts.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("sequence model is not loaded")]
    NotLoaded,

    #[error("input shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("model produced no output")]
    EmptyOutput,

    #[error("model has {outputs} outputs but {classes} class names")]
    ClassCountMismatch { outputs: usize, classes: usize },

    #[error("model file not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("onnx runtime: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("metadata io: {0}")]
    MetadataIo(#[from] io::Error),

    #[error("metadata json: {0}")]
    MetadataJson(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog io: {0}")]
    Io(#[from] io::Error),

    #[error("catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog root must be a JSON object of label -> definition")]
    NotAnObject,

    #[error("catalog is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config toml: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("nng: {0}")]
    Nng(#[from] nng::Error),

    #[error("wire json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset io ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sample json ({path}): {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("npy write: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("metadata json: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("no labelled samples found under {0}")]
    Empty(PathBuf),
}
