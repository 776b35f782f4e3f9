use thiserror::Error;

use crate::grafeas::{Code, Status};

/// Errors returned by the metadata client.
#[derive(Error, Debug)] // can't derive PartialEq because of anyhow::Error
pub enum Error {
    #[error("{0} is not a valid image hosted in GCR")]
    InvalidImage(String),
    #[error("Invalid Note Reference {0:?}. Should be in format <api>/projects/<project_id>")]
    MalformedNoteReference(String),
    #[error("remote call failed: {0}")]
    Remote(#[from] Status),
    #[error("occurrence {occurrence:?} has {found} details, expected {expected}")]
    TypeMismatch {
        occurrence: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("cannot build attestation payload for {image}: {reason}")]
    Payload { image: String, reason: String },
    #[error("cannot encode attestation payload")]
    Encoding(#[from] serde_json::Error),
    #[error("signing failed")]
    Signing(#[source] anyhow::Error),
}

impl Error {
    /// Whether this is the remote service reporting a missing note or occurrence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Remote(status) if status.code() == Code::NotFound)
    }

    /// Whether this is the remote service rejecting a duplicate create.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Remote(status) if status.code() == Code::AlreadyExists)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
