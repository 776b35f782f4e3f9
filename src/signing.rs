//! Signing of attestation payloads.
//!
//! The cryptography is delegated: a [`Signer`] turns a payload plus a [`PgpSigningKey`] into an
//! ASCII-armored detached signature.  [`GpgSigner`] does this by running the `gpg` executable in a
//! throw-away home directory, so no keyring state outlives the call.
//!
//! The payload is an "atomic container signature" document binding the image's repository name
//! to its manifest digest:
//!
//! ```json
//! {"critical":{"identity":{"docker-reference":"gcr.io/proj/img"},
//!              "image":{"docker-manifest-digest":"sha256:..."},
//!              "type":"atomic container signature"}}
//! ```

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
    error::{Error, Result},
    image::TrustedImage,
};

pub const ATOMIC_CONTAINER_SIG_TYPE: &str = "atomic container signature";

/// A PGP key used to sign attestations.
///
/// Only `secret_name` is ever recorded remotely, as the key id of the attestation.
#[derive(Clone)]
pub struct PgpSigningKey {
    secret_name: String,
    private_key: String,
}

impl std::fmt::Debug for PgpSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgpSigningKey")
            .field("secret_name", &self.secret_name)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl PgpSigningKey {
    /// `private_key` is the ASCII-armored secret key.
    pub fn new(secret_name: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            private_key: private_key.into(),
        }
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "docker-reference")]
    pub docker_reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDigest {
    #[serde(rename = "docker-manifest-digest")]
    pub docker_manifest_digest: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critical {
    pub identity: Identity,
    pub image: ImageDigest,
    #[serde(rename = "type")]
    pub sig_type: String,
}

/// The document that gets signed when attesting an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicContainerSig {
    pub critical: Critical,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional: BTreeMap<String, String>,
}

impl AtomicContainerSig {
    /// The payload for `image`, which must be pinned by digest.
    pub fn new(image: &TrustedImage, optional: BTreeMap<String, String>) -> Result<Self> {
        let Some(digest) = image.digest() else {
            return Err(Error::Payload {
                image: image.to_string(),
                reason: "image must be referenced by digest".to_string(),
            });
        };
        Ok(Self {
            critical: Critical {
                identity: Identity {
                    docker_reference: image.name(),
                },
                image: ImageDigest {
                    docker_manifest_digest: digest.to_string(),
                },
                sig_type: ATOMIC_CONTAINER_SIG_TYPE.to_string(),
            },
            optional,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Produces detached signatures.  Implementations must not keep the payload or signature around.
///
/// Signing is a plain future like every remote call: dropping it abandons the signature and
/// whatever work it was waiting on.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        payload: &[u8],
        key: &PgpSigningKey,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Signs the canonical attestation payload for `image` with `key`.
pub async fn create_attestation_signature(
    signer: &impl Signer,
    image: &TrustedImage,
    key: &PgpSigningKey,
) -> Result<String> {
    let payload = AtomicContainerSig::new(image, BTreeMap::new())?.to_json()?;
    signer
        .sign(payload.as_bytes(), key)
        .await
        .map_err(Error::Signing)
}

/// A [`Signer`] backed by the `gpg` command line tool.
///
/// The child process is killed if the signing future is dropped before it finishes.
#[derive(Clone, Debug)]
pub struct GpgSigner {
    program: PathBuf,
}

impl Default for GpgSigner {
    fn default() -> Self {
        Self::new("gpg")
    }
}

impl GpgSigner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run<S: AsRef<OsStr>>(
        &self,
        home: &Path,
        args: &[S],
        input: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .env("GNUPGHOME", home)
            .args(["--batch", "--no-tty", "--quiet"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Spawning {:?}", self.program))?;

        // Feed stdin while draining stdout/stderr, so neither side can fill a pipe and stall.
        // Dropping `stdin` at the end of the write closes it, which gpg waits for.
        let mut stdin = child.stdin.take().context("gpg stdin is not piped")?;
        let feed = async move {
            match stdin.write_all(input).await {
                // gpg quit without reading; its exit status tells why
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                res => res.context("Writing to gpg"),
            }
        };
        let wait = async move { child.wait_with_output().await.context("Waiting for gpg") };
        let ((), output) = tokio::try_join!(feed, wait)?;

        ensure!(
            output.status.success(),
            "gpg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(output.stdout)
    }
}

impl Signer for GpgSigner {
    async fn sign(&self, payload: &[u8], key: &PgpSigningKey) -> anyhow::Result<String> {
        let home = TempDir::with_prefix("gnupg-")?;
        self.run(home.path(), &["--import"], key.private_key().as_bytes())
            .await
            .context("Importing signing key")?;
        let signature = self
            .run(home.path(), &["--armor", "--detach-sign"], payload)
            .await
            .context("Creating detached signature")?;
        Ok(String::from_utf8(signature)?)
    }
}
