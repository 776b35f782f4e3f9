use crate::{
    authority::AttestationAuthority,
    error::Result,
    grafeas::{Attestation, Details, Grafeas, Kind, Note, Occurrence, PgpSignedAttestation},
    image::TrustedImage,
    metadata::{
        pgp_attestation_from_occurrence, vulnerability_from_occurrence, PgpAttestation,
        Vulnerability,
    },
    pager::OccurrencePager,
    query,
    signing::{create_attestation_signature, PgpSigningKey, Signer},
};

/// Reads vulnerability and attestation metadata for trusted images, and records attestations.
///
/// Holds no state besides the service client and the signer: every call validates its image
/// reference afresh and goes straight to the service.  Nothing is cached or retried.
pub struct ContainerAnalysis<C, S> {
    client: C,
    signer: S,
}

impl<C: Grafeas, S: Signer> ContainerAnalysis<C, S> {
    pub fn new(client: C, signer: S) -> Self {
        Self { client, signer }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Lists every occurrence of `kind` recorded for `image`, in service order.
    pub async fn fetch_occurrences(&self, image: &str, kind: Kind) -> Result<Vec<Occurrence>> {
        let image = TrustedImage::parse(image)?;
        let request = query::list_request(image.as_str(), kind);
        log::debug!("Listing {} with {}", request.parent, request.filter);
        Ok(OccurrencePager::new(&self.client, request).collect().await?)
    }

    pub async fn get_vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>> {
        self.fetch_occurrences(image, Kind::PackageVulnerability)
            .await?
            .iter()
            .map(vulnerability_from_occurrence)
            .collect()
    }

    pub async fn get_attestations(&self, image: &str) -> Result<Vec<PgpAttestation>> {
        self.fetch_occurrences(image, Kind::AttestationAuthority)
            .await?
            .iter()
            .map(pgp_attestation_from_occurrence)
            .collect()
    }

    /// Creates the note for `authority`.  An existing note is reported by the service as
    /// `AlreadyExists`, which is passed on.
    pub async fn create_attestation_note(&self, authority: &AttestationAuthority) -> Result<Note> {
        let parent = query::project_path(authority.note_project()?);
        let note = authority.note()?;
        log::debug!("Creating note {}", note.name);
        Ok(self
            .client
            .create_note(&parent, &authority.name, note)
            .await?)
    }

    pub async fn get_attestation_note(&self, authority: &AttestationAuthority) -> Result<Note> {
        let name = authority.note_name()?;
        log::debug!("Fetching note {name}");
        Ok(self.client.get_note(&name).await?)
    }

    /// Signs `image` with `key` and records the signature as an occurrence of `note`.
    ///
    /// The image is validated before the signer is involved.
    pub async fn create_attestation_occurrence(
        &self,
        note: &Note,
        image: &str,
        key: &PgpSigningKey,
    ) -> Result<Occurrence> {
        let image = TrustedImage::parse(image)?;
        let signature = create_attestation_signature(&self.signer, &image, key).await?;

        let occurrence = Occurrence {
            resource_url: image.resource_url(),
            note_name: note.name.clone(),
            kind: Some(Kind::AttestationAuthority),
            details: Some(Details::Attestation(Attestation {
                pgp_signed_attestation: Some(PgpSignedAttestation {
                    signature,
                    pgp_key_id: key.secret_name().to_string(),
                }),
            })),
            ..Default::default()
        };
        log::debug!("Attesting {image} under {}", note.name);
        Ok(self
            .client
            .create_occurrence(&image.project_path(), occurrence)
            .await?)
    }

    /// Deletes the note for `authority`.  Its occurrences are left alone.
    pub async fn delete_attestation_note(&self, authority: &AttestationAuthority) -> Result<()> {
        let name = authority.note_name()?;
        log::debug!("Deleting note {name}");
        Ok(self.client.delete_note(&name).await?)
    }

    pub async fn delete_occurrence(&self, name: &str) -> Result<()> {
        log::debug!("Deleting occurrence {name}");
        Ok(self.client.delete_occurrence(name).await?)
    }
}
