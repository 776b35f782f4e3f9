//! Attestation authorities and the notes that represent them.

use crate::{
    error::{Error, Result},
    grafeas::{AttestationAuthorityHint, AttestationAuthorityNote, Kind, Note},
    query,
};

pub const NOTE_SHORT_DESCRIPTION: &str = "Image Policy Security Attestor";

/// An identity allowed to attest images, as configured by the policy layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationAuthority {
    /// Also used as the note id.
    pub name: String,
    /// The namespace the authority is deployed in.
    pub namespace: String,
    /// `<api>/projects/<project>[/...]`
    pub note_reference: String,
}

impl AttestationAuthority {
    /// The project that owns this authority's note.
    pub fn note_project(&self) -> Result<&str> {
        note_project(&self.note_reference)
    }

    /// `projects/<project>/notes/<name>`
    pub fn note_name(&self) -> Result<String> {
        Ok(query::note_name(self.note_project()?, &self.name))
    }

    /// The note describing this authority, ready to be created.
    pub fn note(&self) -> Result<Note> {
        Ok(Note {
            name: self.note_name()?,
            short_description: NOTE_SHORT_DESCRIPTION.to_string(),
            long_description: format!(
                "{NOTE_SHORT_DESCRIPTION} deployed in {} namespace",
                self.namespace
            ),
            kind: Some(Kind::AttestationAuthority),
            attestation_authority: Some(AttestationAuthorityNote {
                hint: Some(AttestationAuthorityHint {
                    human_readable_name: self.name.clone(),
                }),
            }),
        })
    }
}

/// Extracts the project from a note reference like `v1alpha1/projects/my-proj`.
///
/// The project is whatever follows the first `projects` segment.  References without one fall
/// back to the third segment.  Fewer than three segments, or an empty project, is an error.
pub fn note_project(reference: &str) -> Result<&str> {
    let segments: Vec<&str> = reference.split('/').collect();
    let malformed = || Error::MalformedNoteReference(reference.to_string());

    if segments.len() < 3 {
        return Err(malformed());
    }
    let project = match segments.iter().position(|s| *s == "projects") {
        Some(idx) => segments.get(idx + 1).copied().ok_or_else(malformed)?,
        None => segments[2],
    };
    if project.is_empty() {
        return Err(malformed());
    }
    Ok(project)
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    fn authority(note_reference: &str) -> AttestationAuthority {
        AttestationAuthority {
            name: "qa-attestor".to_string(),
            namespace: "qa".to_string(),
            note_reference: note_reference.to_string(),
        }
    }

    #[test]
    fn project_from_reference() {
        assert_eq!(note_project("v1alpha1/projects/my-proj").unwrap(), "my-proj");
        assert_eq!(note_project("https://api/projects/my-proj").unwrap(), "my-proj");
        assert_eq!(
            note_project("https://containeranalysis.googleapis.com/v1alpha1/projects/p/notes/n")
                .unwrap(),
            "p"
        );
        assert_eq!(note_project("a/b/c").unwrap(), "c");
    }

    #[test]
    fn malformed_references() {
        for bad in ["bad", "", "a/b", "v1alpha1/projects/", "a/b/c/projects", "a//"] {
            assert!(
                matches!(note_project(bad), Err(Error::MalformedNoteReference(r)) if r == bad),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn note() {
        let note = authority("v1alpha1/projects/my-proj").note().unwrap();
        assert_eq!(
            note,
            Note {
                name: "projects/my-proj/notes/qa-attestor".to_string(),
                short_description: "Image Policy Security Attestor".to_string(),
                long_description: "Image Policy Security Attestor deployed in qa namespace"
                    .to_string(),
                kind: Some(Kind::AttestationAuthority),
                attestation_authority: Some(AttestationAuthorityNote {
                    hint: Some(AttestationAuthorityHint {
                        human_readable_name: "qa-attestor".to_string(),
                    }),
                }),
            }
        );
        assert!(authority("bad").note().is_err());
    }
}
