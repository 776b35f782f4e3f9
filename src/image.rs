//! Gatekeeping for image references.
//!
//! Only images hosted under the trusted registry domain are ever looked up or attested.  Anything
//! else is rejected before a remote call is made.

use std::{fmt, str::FromStr};

use oci_spec::distribution::Reference;

use crate::{
    error::{Error, Result},
    query,
};

/// The last two DNS labels every trusted registry host must end with.
pub const TRUSTED_REGISTRY_SUFFIX: [&str; 2] = ["gcr", "io"];

/// Checks whether `image` names a container image hosted on the trusted registry.
///
/// Parsing is lenient: a missing tag is fine and nothing is resolved over the network.  A
/// reference that doesn't parse is logged and reported as untrusted, never as an error.  This
/// agrees with [`TrustedImage::parse`], so an image accepted here is accepted by every operation.
pub fn is_valid_trusted_image(image: &str) -> bool {
    TrustedImage::parse(image).is_ok()
}

fn is_trusted_registry(registry: &str) -> bool {
    let labels: Vec<&str> = registry.split('.').collect();
    labels.len() >= 2 && labels[labels.len() - 2..] == TRUSTED_REGISTRY_SUFFIX
}

/// A reference to an image on the trusted registry, split into its parts once so that nothing
/// downstream has to re-split strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrustedImage {
    raw: String,
    registry: String,
    project: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl TrustedImage {
    /// Validates `image` and splits it into `registry/project/repository[:tag][@digest]`.
    ///
    /// Fails with [`Error::InvalidImage`] for anything outside the trusted registry, and for
    /// references that have no project component.
    pub fn parse(image: &str) -> Result<Self> {
        let invalid = || Error::InvalidImage(image.to_string());
        let reference: Reference = match image.parse() {
            Ok(reference) => reference,
            Err(err) => {
                log::warn!("Failed to parse image reference {image:?}: {err}");
                return Err(invalid());
            }
        };
        if !is_trusted_registry(reference.registry()) {
            return Err(invalid());
        }

        let project = query::project_scope(image);
        let Some((repo_project, _)) = reference.repository().split_once('/') else {
            return Err(invalid());
        };
        if project.is_empty() || project != repo_project {
            return Err(invalid());
        }

        Ok(TrustedImage {
            raw: image.to_string(),
            registry: reference.registry().to_string(),
            project: project.to_string(),
            repository: reference.repository().to_string(),
            tag: reference.tag().map(str::to_string),
            digest: reference.digest().map(str::to_string),
        })
    }

    /// The reference exactly as the caller wrote it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The tenant that owns the image; every remote call for this image is scoped to it.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The path below the registry, including the project (`project/name`).
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The `registry/repository` name without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    pub fn resource_url(&self) -> String {
        query::resource_url(&self.raw)
    }

    pub fn project_path(&self) -> String {
        query::project_path(&self.project)
    }
}

impl FromStr for TrustedImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TrustedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    const DIGEST: &str = "sha256:0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn trusted_registries() {
        assert!(is_valid_trusted_image("gcr.io/proj/img"));
        assert!(is_valid_trusted_image("us.gcr.io/proj/img:tag"));
        assert!(is_valid_trusted_image("eu.gcr.io/proj/nested/img:1.0"));
        assert!(is_valid_trusted_image(&format!("asia.gcr.io/proj/img@{DIGEST}")));
    }

    #[test]
    fn untrusted_registries() {
        assert!(!is_valid_trusted_image("docker.io/proj/img"));
        assert!(!is_valid_trusted_image("proj/img"));
        assert!(!is_valid_trusted_image("img"));
        assert!(!is_valid_trusted_image("quay.io/gcr.io/img"));
        assert!(!is_valid_trusted_image("gcr.io.evil.com/proj/img"));
        assert!(!is_valid_trusted_image("gcr.evil.io/proj/img"));
        assert!(!is_valid_trusted_image("localhost:5000/proj/img"));
        assert!(!is_valid_trusted_image("gcr.io:443/proj/img"));
    }

    #[test]
    fn unparsable_is_untrusted() {
        assert!(!is_valid_trusted_image(""));
        assert!(!is_valid_trusted_image("gcr.io/Proj/IMG"));
        assert!(!is_valid_trusted_image("gcr.io/proj/img:tag with spaces"));
    }

    #[test]
    fn registry_suffix_check() {
        assert!(is_trusted_registry("gcr.io"));
        assert!(is_trusted_registry("us.gcr.io"));
        assert!(!is_trusted_registry("io"));
        assert!(!is_trusted_registry("gcr"));
        assert!(!is_trusted_registry("gcr.io."));
        assert!(!is_trusted_registry("xgcr.io"));
    }

    #[test]
    fn parse_parts() {
        let image = TrustedImage::parse("us.gcr.io/proj/img:tag").unwrap();
        assert_eq!(image.as_str(), "us.gcr.io/proj/img:tag");
        assert_eq!(image.registry(), "us.gcr.io");
        assert_eq!(image.project(), "proj");
        assert_eq!(image.repository(), "proj/img");
        assert_eq!(image.tag(), Some("tag"));
        assert_eq!(image.digest(), None);
        assert_eq!(image.name(), "us.gcr.io/proj/img");
        assert_eq!(image.resource_url(), "https://us.gcr.io/proj/img:tag");
        assert_eq!(image.project_path(), "projects/proj");
        assert_eq!(image.to_string(), "us.gcr.io/proj/img:tag");
    }

    #[test]
    fn parse_digest() {
        let raw = format!("gcr.io/proj/img@{DIGEST}");
        let image: TrustedImage = raw.parse().unwrap();
        assert_eq!(image.digest(), Some(DIGEST));
        assert_eq!(image.project(), "proj");
    }

    #[test]
    fn predicate_agrees_with_parse() {
        for image in [
            "gcr.io/img",
            "gcr.io/proj/img",
            "us.gcr.io/proj/img:tag",
            "docker.io/proj/img",
            "",
        ] {
            assert_eq!(
                is_valid_trusted_image(image),
                TrustedImage::parse(image).is_ok(),
                "{image}"
            );
        }
        assert!(!is_valid_trusted_image("gcr.io/img"));
    }

    #[test]
    fn parse_rejects() {
        for bad in ["docker.io/proj/img", "gcr.io/img", "not a reference"] {
            assert!(
                matches!(TrustedImage::parse(bad), Err(Error::InvalidImage(s)) if s == bad),
                "{bad} should be rejected"
            );
        }
    }
}
