//! An in-process [`Grafeas`] implementation.
//!
//! Behaves like the real service as far as this crate can tell: listings are filtered and paged,
//! names are assigned on creation, duplicates and missing names are reported with the same status
//! codes.  Useful for tests and dry runs.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use crate::grafeas::{
    Code, Details, Grafeas, Kind, ListOccurrencesRequest, Note, Occurrence, OccurrencePage,
    Status,
};

#[derive(Default)]
struct Store {
    notes: BTreeMap<String, Note>,
    // in creation order, which is also listing order
    occurrences: Vec<Occurrence>,
    next_id: u64,
    // returned by every service call while set
    failure: Option<Status>,
}

impl Store {
    fn add_occurrence(&mut self, parent: &str, mut occurrence: Occurrence) -> Occurrence {
        self.next_id += 1;
        occurrence.name = format!("{parent}/occurrences/{}", self.next_id);
        if occurrence.kind.is_none() {
            occurrence.kind = match occurrence.details {
                Some(Details::Vulnerability(_)) => Some(Kind::PackageVulnerability),
                Some(Details::Attestation(_)) => Some(Kind::AttestationAuthority),
                _ => None,
            };
        }
        self.occurrences.push(occurrence.clone());
        occurrence
    }
}

#[derive(Default)]
pub struct MemoryGrafeas {
    store: Mutex<Store>,
    list_calls: AtomicUsize,
}

impl MemoryGrafeas {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> Result<MutexGuard<'_, Store>, Status> {
        self.store
            .lock()
            .map_err(|_| Status::new(Code::Internal, "store lock poisoned"))
    }

    // The store as seen by service calls, which fail while a failure is injected.
    fn serve(&self) -> Result<MutexGuard<'_, Store>, Status> {
        let store = self.store()?;
        if let Some(status) = &store.failure {
            return Err(status.clone());
        }
        Ok(store)
    }

    /// Makes every subsequent service call fail with `failure`, or succeed again with `None`.
    pub fn set_failure(&self, failure: Option<Status>) -> Result<(), Status> {
        self.store()?.failure = failure;
        Ok(())
    }

    /// Records an occurrence as if an analyzer had written it, without checking its note.
    pub fn insert_occurrence(
        &self,
        parent: &str,
        occurrence: Occurrence,
    ) -> Result<Occurrence, Status> {
        Ok(self.store()?.add_occurrence(parent, occurrence))
    }

    /// How many listing pages have been requested so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn occurrences(&self) -> Result<Vec<Occurrence>, Status> {
        Ok(self.store()?.occurrences.clone())
    }
}

/// Splits `field="value" AND field="value"` into its clauses.
fn parse_filter(filter: &str) -> Result<Vec<(String, String)>, Status> {
    let invalid = || Status::new(Code::InvalidArgument, format!("invalid filter {filter:?}"));
    let mut clauses = vec![];
    let mut rest = filter.trim();

    while !rest.is_empty() {
        let (field, after) = rest.split_once('=').ok_or_else(invalid)?;
        let mut chars = after.trim_start().char_indices();
        if !matches!(chars.next(), Some((_, '"'))) {
            return Err(invalid());
        }

        let mut value = String::new();
        let mut end = None;
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => value.push(chars.next().ok_or_else(invalid)?.1),
                '"' => {
                    end = Some(idx + 1);
                    break;
                }
                other => value.push(other),
            }
        }
        let end = end.ok_or_else(invalid)?;
        clauses.push((field.trim().to_string(), value));

        rest = after.trim_start()[end..].trim_start();
        if !rest.is_empty() {
            rest = rest.strip_prefix("AND").ok_or_else(invalid)?.trim_start();
        }
    }

    Ok(clauses)
}

fn clauses_match(occurrence: &Occurrence, clauses: &[(String, String)]) -> Result<bool, Status> {
    for (field, value) in clauses {
        let actual = match field.as_str() {
            "resource_url" => occurrence.resource_url.as_str(),
            "note_name" => occurrence.note_name.as_str(),
            "kind" => occurrence.kind.map_or("", |kind| kind.as_str_name()),
            other => {
                return Err(Status::new(
                    Code::InvalidArgument,
                    format!("unsupported filter field {other:?}"),
                ))
            }
        };
        if actual != value {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Grafeas for MemoryGrafeas {
    async fn list_occurrences(
        &self,
        request: &ListOccurrencesRequest,
        page_token: Option<&str>,
    ) -> Result<OccurrencePage, Status> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let clauses = parse_filter(&request.filter)?;
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Status::new(Code::InvalidArgument, "invalid page token"))?,
            None => 0,
        };
        let page_size = usize::try_from(request.page_size.max(1)).unwrap_or(1);
        let prefix = format!("{}/occurrences/", request.parent);

        let store = self.serve()?;
        let mut selected = vec![];
        for occurrence in &store.occurrences {
            if occurrence.name.starts_with(&prefix) && clauses_match(occurrence, &clauses)? {
                selected.push(occurrence);
            }
        }

        let occurrences: Vec<Occurrence> = selected
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|occurrence| (*occurrence).clone())
            .collect();
        let next = offset + occurrences.len();
        Ok(OccurrencePage {
            occurrences,
            next_page_token: (next < selected.len()).then(|| next.to_string()),
        })
    }

    async fn get_note(&self, name: &str) -> Result<Note, Status> {
        self.serve()?
            .notes
            .get(name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("note {name} not found")))
    }

    async fn create_note(
        &self,
        parent: &str,
        note_id: &str,
        mut note: Note,
    ) -> Result<Note, Status> {
        let name = format!("{parent}/notes/{note_id}");
        let mut store = self.serve()?;
        if store.notes.contains_key(&name) {
            return Err(Status::already_exists(format!("note {name} already exists")));
        }
        note.name = name.clone();
        if note.attestation_authority.is_some() {
            note.kind = Some(Kind::AttestationAuthority);
        }
        store.notes.insert(name, note.clone());
        Ok(note)
    }

    async fn delete_note(&self, name: &str) -> Result<(), Status> {
        match self.serve()?.notes.remove(name) {
            Some(_) => Ok(()),
            None => Err(Status::not_found(format!("note {name} not found"))),
        }
    }

    async fn create_occurrence(
        &self,
        parent: &str,
        occurrence: Occurrence,
    ) -> Result<Occurrence, Status> {
        let mut store = self.serve()?;
        if !store.notes.contains_key(&occurrence.note_name) {
            return Err(Status::not_found(format!(
                "note {} not found",
                occurrence.note_name
            )));
        }
        Ok(store.add_occurrence(parent, occurrence))
    }

    async fn delete_occurrence(&self, name: &str) -> Result<(), Status> {
        let mut store = self.serve()?;
        match store.occurrences.iter().position(|o| o.name == name) {
            Some(idx) => {
                store.occurrences.remove(idx);
                Ok(())
            }
            None => Err(Status::not_found(format!("occurrence {name} not found"))),
        }
    }
}
