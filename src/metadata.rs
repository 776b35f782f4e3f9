//! The domain view of occurrences that policy evaluation consumes.

use serde::Serialize;

use crate::{
    error::{Error, Result},
    grafeas::{Details, Occurrence, PackageIssue, VersionKind},
};

/// A vulnerability finding for an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    /// The severity enum name, e.g. `HIGH`.
    pub severity: String,
    pub has_fix_available: bool,
    /// The name of the note the finding is attached to.  The service keys vulnerability notes by
    /// CVE, so this stands in for the CVE identifier.
    pub cve: String,
}

/// A PGP signature over an image, as recorded by an attestation authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PgpAttestation {
    pub signature: String,
    pub key_id: String,
}

fn mismatch(occurrence: &Occurrence, expected: &'static str) -> Error {
    Error::TypeMismatch {
        occurrence: occurrence.name.clone(),
        expected,
        found: occurrence
            .details
            .as_ref()
            .map_or("no", Details::variant_name),
    }
}

/// A fix is available unless some package issue has a fixed location with no upper bound.
pub fn is_fix_available(issues: &[PackageIssue]) -> bool {
    !issues
        .iter()
        .any(|issue| issue.fixed_version_kind() == VersionKind::Maximum)
}

/// Projects a vulnerability occurrence onto a [`Vulnerability`].
///
/// Fails with [`Error::TypeMismatch`] if `occurrence` carries anything but vulnerability details.
/// That can only happen if the listing filter and the extractor disagree.
pub fn vulnerability_from_occurrence(occurrence: &Occurrence) -> Result<Vulnerability> {
    let Some(Details::Vulnerability(details)) = &occurrence.details else {
        return Err(mismatch(occurrence, "vulnerability"));
    };
    Ok(Vulnerability {
        severity: details.severity.as_str_name().to_string(),
        has_fix_available: is_fix_available(&details.package_issue),
        cve: occurrence.note_name.clone(),
    })
}

/// Projects an attestation occurrence onto a [`PgpAttestation`].
///
/// An attestation without a PGP-signed payload yields empty fields.
pub fn pgp_attestation_from_occurrence(occurrence: &Occurrence) -> Result<PgpAttestation> {
    let Some(Details::Attestation(attestation)) = &occurrence.details else {
        return Err(mismatch(occurrence, "attestation"));
    };
    let pgp = attestation
        .pgp_signed_attestation
        .clone()
        .unwrap_or_default();
    Ok(PgpAttestation {
        signature: pgp.signature,
        key_id: pgp.pgp_key_id,
    })
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::grafeas::{
        Attestation, Kind, PgpSignedAttestation, Severity, Version, VulnerabilityDetails,
        VulnerabilityLocation,
    };

    fn issue(kind: VersionKind) -> PackageIssue {
        PackageIssue {
            fixed_location: Some(VulnerabilityLocation {
                package: "openssl".to_string(),
                version: Some(Version {
                    kind,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn vuln_occurrence(severity: Severity, issues: Vec<PackageIssue>) -> Occurrence {
        Occurrence {
            name: "projects/proj/occurrences/1".to_string(),
            resource_url: "https://gcr.io/proj/img".to_string(),
            note_name: "projects/goog-vulnz/notes/CVE-2018-1000001".to_string(),
            kind: Some(Kind::PackageVulnerability),
            details: Some(Details::Vulnerability(VulnerabilityDetails {
                severity,
                package_issue: issues,
                ..Default::default()
            })),
        }
    }

    #[test]
    fn fix_availability() {
        assert!(is_fix_available(&[]));
        assert!(is_fix_available(&[issue(VersionKind::Normal), PackageIssue::default()]));
        assert!(!is_fix_available(&[issue(VersionKind::Maximum)]));
        assert!(!is_fix_available(&[
            issue(VersionKind::Normal),
            issue(VersionKind::Maximum),
            issue(VersionKind::Minimum),
        ]));
    }

    #[test]
    fn vulnerability() {
        let occ = vuln_occurrence(Severity::High, vec![issue(VersionKind::Normal)]);
        assert_eq!(
            vulnerability_from_occurrence(&occ).unwrap(),
            Vulnerability {
                severity: "HIGH".to_string(),
                has_fix_available: true,
                cve: "projects/goog-vulnz/notes/CVE-2018-1000001".to_string(),
            }
        );

        let occ = vuln_occurrence(Severity::Unspecified, vec![issue(VersionKind::Maximum)]);
        let vuln = vulnerability_from_occurrence(&occ).unwrap();
        assert_eq!(vuln.severity, "SEVERITY_UNSPECIFIED");
        assert!(!vuln.has_fix_available);
    }

    #[test]
    fn attestation() {
        let occ = Occurrence {
            note_name: "projects/proj/notes/qa".to_string(),
            details: Some(Details::Attestation(Attestation {
                pgp_signed_attestation: Some(PgpSignedAttestation {
                    signature: "-----BEGIN PGP SIGNATURE-----".to_string(),
                    pgp_key_id: "qa-key".to_string(),
                }),
            })),
            ..Default::default()
        };
        assert_eq!(
            pgp_attestation_from_occurrence(&occ).unwrap(),
            PgpAttestation {
                signature: "-----BEGIN PGP SIGNATURE-----".to_string(),
                key_id: "qa-key".to_string(),
            }
        );
    }

    #[test]
    fn wrong_variant() {
        let occ = vuln_occurrence(Severity::Low, vec![]);
        assert!(matches!(
            pgp_attestation_from_occurrence(&occ),
            Err(Error::TypeMismatch {
                expected: "attestation",
                found: "vulnerability",
                ..
            })
        ));

        let occ = Occurrence::default();
        assert!(matches!(
            vulnerability_from_occurrence(&occ),
            Err(Error::TypeMismatch { found: "no", .. })
        ));

        let occ = Occurrence {
            details: Some(Details::Other("buildDetails".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            vulnerability_from_occurrence(&occ),
            Err(Error::TypeMismatch { found: "other", .. })
        ));
    }
}
