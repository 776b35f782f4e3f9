//! [`Grafeas`] over the Container Analysis `v1alpha1` REST API.

use std::time::Duration;

use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::grafeas::{
    Attestation, AttestationAuthorityNote, Code, Details, Grafeas, Kind, ListOccurrencesRequest,
    Note, Occurrence, OccurrencePage, Status, VulnerabilityDetails,
};

pub const DEFAULT_ENDPOINT: &str = "https://containeranalysis.googleapis.com";
const API_VERSION: &str = "v1alpha1";

pub struct RestGrafeas {
    client: reqwest::Client,
    endpoint: Url,
}

impl RestGrafeas {
    /// A client for the service at `endpoint`, authenticating with `token` if given.
    pub fn new(endpoint: &str, token: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            endpoint.set_path(&format!("{}/", endpoint.path()));
        }

        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {token}"))?;
            auth_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth_value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, Status> {
        let url = self
            .endpoint
            .join(&format!("{API_VERSION}/{path}"))
            .map_err(|err| Status::new(Code::InvalidArgument, format!("{path}: {err}")))?;
        Ok(self.client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Status> {
        let response = request.send().await.map_err(transport_status)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_status(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Status> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(transport_status)
    }
}

fn transport_status(err: reqwest::Error) -> Status {
    let code = if err.is_timeout() {
        Code::DeadlineExceeded
    } else if err.is_connect() {
        Code::Unavailable
    } else {
        Code::Unknown
    };
    Status::new(code, err.to_string())
}

fn http_code(status: StatusCode) -> Code {
    match status {
        StatusCode::BAD_REQUEST => Code::InvalidArgument,
        StatusCode::UNAUTHORIZED => Code::Unauthenticated,
        StatusCode::FORBIDDEN => Code::PermissionDenied,
        StatusCode::NOT_FOUND => Code::NotFound,
        StatusCode::CONFLICT => Code::AlreadyExists,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => Code::Unavailable,
        StatusCode::GATEWAY_TIMEOUT => Code::DeadlineExceeded,
        StatusCode::INTERNAL_SERVER_ERROR => Code::Internal,
        _ => Code::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDetail {
    message: String,
}

async fn error_status(response: Response) -> Status {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) if !body.error.message.is_empty() => body.error.message,
        _ => status.to_string(),
    };
    Status::new(http_code(status), message)
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OccurrenceJson {
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
    resource_url: String,
    note_name: String,
    #[serde(skip_serializing)]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vulnerability_details: Option<VulnerabilityDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attestation: Option<Attestation>,
    // details we never interpret, only recognise
    #[serde(skip_serializing)]
    build_details: Option<serde_json::Value>,
    #[serde(skip_serializing)]
    derived_image: Option<serde_json::Value>,
    #[serde(skip_serializing)]
    installation: Option<serde_json::Value>,
    #[serde(skip_serializing)]
    deployment: Option<serde_json::Value>,
    #[serde(skip_serializing)]
    discovered: Option<serde_json::Value>,
}

impl From<OccurrenceJson> for Occurrence {
    fn from(json: OccurrenceJson) -> Self {
        let other = [
            ("buildDetails", &json.build_details),
            ("derivedImage", &json.derived_image),
            ("installation", &json.installation),
            ("deployment", &json.deployment),
            ("discovered", &json.discovered),
        ]
        .into_iter()
        .find_map(|(field, value)| value.as_ref().map(|_| Details::Other(field.to_string())));

        let details = match (json.vulnerability_details, json.attestation) {
            (Some(vulnerability), _) => Some(Details::Vulnerability(vulnerability)),
            (None, Some(attestation)) => Some(Details::Attestation(attestation)),
            (None, None) => other,
        };

        Occurrence {
            name: json.name,
            resource_url: json.resource_url,
            note_name: json.note_name,
            kind: Kind::from_str_name(&json.kind),
            details,
        }
    }
}

impl From<Occurrence> for OccurrenceJson {
    fn from(occurrence: Occurrence) -> Self {
        let mut json = OccurrenceJson {
            name: occurrence.name,
            resource_url: occurrence.resource_url,
            note_name: occurrence.note_name,
            ..Default::default()
        };
        match occurrence.details {
            Some(Details::Vulnerability(details)) => json.vulnerability_details = Some(details),
            Some(Details::Attestation(attestation)) => json.attestation = Some(attestation),
            Some(Details::Other(_)) | None => {}
        }
        json
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct NoteJson {
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
    short_description: String,
    long_description: String,
    #[serde(skip_serializing)]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attestation_authority: Option<AttestationAuthorityNote>,
}

impl From<NoteJson> for Note {
    fn from(json: NoteJson) -> Self {
        Note {
            name: json.name,
            short_description: json.short_description,
            long_description: json.long_description,
            kind: Kind::from_str_name(&json.kind),
            attestation_authority: json.attestation_authority,
        }
    }
}

impl From<Note> for NoteJson {
    fn from(note: Note) -> Self {
        NoteJson {
            name: note.name,
            short_description: note.short_description,
            long_description: note.long_description,
            kind: String::new(),
            attestation_authority: note.attestation_authority,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListOccurrencesResponse {
    occurrences: Vec<OccurrenceJson>,
    next_page_token: String,
}

impl From<ListOccurrencesResponse> for OccurrencePage {
    fn from(response: ListOccurrencesResponse) -> Self {
        OccurrencePage {
            occurrences: response.occurrences.into_iter().map(Into::into).collect(),
            next_page_token: Some(response.next_page_token).filter(|token| !token.is_empty()),
        }
    }
}

impl Grafeas for RestGrafeas {
    async fn list_occurrences(
        &self,
        request: &ListOccurrencesRequest,
        page_token: Option<&str>,
    ) -> Result<OccurrencePage, Status> {
        let mut query = vec![
            ("filter", request.filter.clone()),
            ("pageSize", request.page_size.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let builder = self
            .request(Method::GET, &format!("{}/occurrences", request.parent))?
            .query(&query);
        let response: ListOccurrencesResponse = self.send_json(builder).await?;
        Ok(response.into())
    }

    async fn get_note(&self, name: &str) -> Result<Note, Status> {
        let note: NoteJson = self.send_json(self.request(Method::GET, name)?).await?;
        Ok(note.into())
    }

    async fn create_note(&self, parent: &str, note_id: &str, note: Note) -> Result<Note, Status> {
        let builder = self
            .request(Method::POST, &format!("{parent}/notes"))?
            .query(&[("noteId", note_id)])
            .json(&NoteJson::from(note));
        let note: NoteJson = self.send_json(builder).await?;
        Ok(note.into())
    }

    async fn delete_note(&self, name: &str) -> Result<(), Status> {
        self.send(self.request(Method::DELETE, name)?).await?;
        Ok(())
    }

    async fn create_occurrence(
        &self,
        parent: &str,
        occurrence: Occurrence,
    ) -> Result<Occurrence, Status> {
        let builder = self
            .request(Method::POST, &format!("{parent}/occurrences"))?
            .json(&OccurrenceJson::from(occurrence));
        let occurrence: OccurrenceJson = self.send_json(builder).await?;
        Ok(occurrence.into())
    }

    async fn delete_occurrence(&self, name: &str) -> Result<(), Status> {
        self.send(self.request(Method::DELETE, name)?).await?;
        Ok(())
    }
}
