//! Client for vulnerability and attestation metadata recorded by a Grafeas-style analysis service.
//!
//! Given a reference to a container image on the trusted registry, this crate:
//!
//! - lists the vulnerability findings and PGP attestations stored for it, projected onto small
//!   domain records ([`Vulnerability`], [`PgpAttestation`])
//! - manages attestation authorities: the note identifying an authority within a project, and the
//!   signed occurrences that record "this image was approved by that authority"
//!
//! Image references are validated before any remote call.  Everything else is a thin mapping
//! onto the service, reached through the [`grafeas::Grafeas`] trait; [`rest::RestGrafeas`] talks
//! to the real API and [`memory::MemoryGrafeas`] keeps everything in-process.

pub mod authority;
pub mod client;
pub mod error;
pub mod grafeas;
pub mod image;
pub mod memory;
pub mod metadata;
pub mod pager;
pub mod query;
pub mod rest;
pub mod signing;

pub use authority::AttestationAuthority;
pub use client::ContainerAnalysis;
pub use error::{Error, Result};
pub use image::{is_valid_trusted_image, TrustedImage};
pub use metadata::{PgpAttestation, Vulnerability};
pub use signing::{GpgSigner, PgpSigningKey, Signer};
