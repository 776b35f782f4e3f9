//! The slice of the Grafeas (Container Analysis `v1alpha1`) data model that this crate reads and
//! writes, plus the [`Grafeas`] trait describing the remote service itself.
//!
//! Occurrences are owned by the remote service.  We only ever read them or create new ones; the
//! kind-specific payload is carried in [`Details`], which has exactly one populated variant.

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The occurrence kinds this crate knows how to query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    PackageVulnerability,
    AttestationAuthority,
}

impl Kind {
    /// The name used by the remote service, in filters and on the wire.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Kind::PackageVulnerability => "PACKAGE_VULNERABILITY",
            Kind::AttestationAuthority => "ATTESTATION_AUTHORITY",
        }
    }

    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "PACKAGE_VULNERABILITY" => Some(Kind::PackageVulnerability),
            "ATTESTATION_AUTHORITY" => Some(Kind::AttestationAuthority),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

/// Vulnerability severity, as assigned by the analysis service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    #[serde(rename = "SEVERITY_UNSPECIFIED")]
    Unspecified,
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Severity::Unspecified => "SEVERITY_UNSPECIFIED",
            Severity::Minimal => "MINIMAL",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// How a [`Version`] should be interpreted.  `Maximum` means "no upper bound", which on a fixed
/// location says that there is no fixed version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionKind {
    #[default]
    Normal,
    Minimum,
    Maximum,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Version {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub revision: String,
    pub kind: VersionKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VulnerabilityLocation {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cpe_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package: String,
    pub version: Option<Version>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageIssue {
    pub affected_location: Option<VulnerabilityLocation>,
    pub fixed_location: Option<VulnerabilityLocation>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub severity_name: String,
}

impl PackageIssue {
    /// The kind of the fixed-location version; absent fields read as the default (`Normal`).
    pub fn fixed_version_kind(&self) -> VersionKind {
        self.fixed_location
            .as_ref()
            .and_then(|location| location.version.as_ref())
            .map(|version| version.kind)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VulnerabilityDetails {
    pub severity: Severity,
    pub cvss_score: f32,
    pub package_issue: Vec<PackageIssue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PgpSignedAttestation {
    pub signature: String,
    pub pgp_key_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attestation {
    pub pgp_signed_attestation: Option<PgpSignedAttestation>,
}

/// The kind-specific payload of an [`Occurrence`].
#[derive(Clone, Debug, PartialEq)]
pub enum Details {
    Vulnerability(VulnerabilityDetails),
    Attestation(Attestation),
    /// Some other kind of details (build, deployment, ...) that we never interpret.
    Other(String),
}

impl Details {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Details::Vulnerability(_) => "vulnerability",
            Details::Attestation(_) => "attestation",
            Details::Other(_) => "other",
        }
    }
}

/// A fact recorded about a resource (here: a container image).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Occurrence {
    /// Server-assigned, `projects/<project>/occurrences/<id>`.  Empty before creation.
    pub name: String,
    pub resource_url: String,
    pub note_name: String,
    /// `None` for kinds that this crate doesn't model.
    pub kind: Option<Kind>,
    pub details: Option<Details>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttestationAuthorityHint {
    pub human_readable_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttestationAuthorityNote {
    pub hint: Option<AttestationAuthorityHint>,
}

/// The durable definition that occurrences point at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Note {
    /// `projects/<project>/notes/<id>`
    pub name: String,
    pub short_description: String,
    pub long_description: String,
    pub kind: Option<Kind>,
    pub attestation_authority: Option<AttestationAuthorityNote>,
}

/// Status codes reported by the remote service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    DeadlineExceeded,
    Unavailable,
    Internal,
    Unknown,
}

/// An error returned by the remote service, passed on to callers unchanged.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOccurrencesRequest {
    /// `projects/<project>`
    pub parent: String,
    pub filter: String,
    pub page_size: i32,
}

/// One page of a listing.  A missing or empty `next_page_token` ends the listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccurrencePage {
    pub occurrences: Vec<Occurrence>,
    pub next_page_token: Option<String>,
}

/// The operations we need from a Grafeas-compatible service.
///
/// Implementations must be usable from several concurrent calls at once.  Each call is a plain
/// future: dropping it cancels the request.
pub trait Grafeas: Send + Sync {
    fn list_occurrences(
        &self,
        request: &ListOccurrencesRequest,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<OccurrencePage, Status>> + Send;

    fn get_note(&self, name: &str) -> impl Future<Output = Result<Note, Status>> + Send;

    fn create_note(
        &self,
        parent: &str,
        note_id: &str,
        note: Note,
    ) -> impl Future<Output = Result<Note, Status>> + Send;

    fn delete_note(&self, name: &str) -> impl Future<Output = Result<(), Status>> + Send;

    fn create_occurrence(
        &self,
        parent: &str,
        occurrence: Occurrence,
    ) -> impl Future<Output = Result<Occurrence, Status>> + Send;

    fn delete_occurrence(&self, name: &str) -> impl Future<Output = Result<(), Status>> + Send;
}
