//! Naming and filter conventions of the remote service.
//!
//! These are plain string builders.  None of them validate anything: callers go through
//! [`crate::image::TrustedImage`] first.

use crate::grafeas::{Kind, ListOccurrencesRequest};

/// Prepended to an image reference to form its resource URL.
pub const RESOURCE_URL_PREFIX: &str = "https://";

/// Page size used for every occurrence listing.
pub const PAGE_SIZE: i32 = 100;

/// The resource URL naming `image` in the remote service.
pub fn resource_url(image: &str) -> String {
    format!("{RESOURCE_URL_PREFIX}{image}")
}

/// The second `/`-separated segment of `image`, or `""` if there isn't one.
pub fn project_scope(image: &str) -> &str {
    image.split('/').nth(1).unwrap_or_default()
}

/// `projects/<project>`
pub fn project_path(project: &str) -> String {
    format!("projects/{project}")
}

/// `projects/<project>/notes/<note_id>`
pub fn note_name(project: &str, note_id: &str) -> String {
    format!("projects/{project}/notes/{note_id}")
}

/// Selects the occurrences of `kind` attached to `resource_url`.
pub fn list_filter(resource_url: &str, kind: Kind) -> String {
    format!(
        "resource_url={} AND kind={}",
        quote(resource_url),
        quote(kind.as_str_name())
    )
}

// Double-quoted with backslash escapes, as the filter grammar expects.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// The listing request for all occurrences of `kind` on `image`, scoped to its project.
pub fn list_request(image: &str, kind: Kind) -> ListOccurrencesRequest {
    ListOccurrencesRequest {
        parent: project_path(project_scope(image)),
        filter: list_filter(&resource_url(image), kind),
        page_size: PAGE_SIZE,
    }
}
