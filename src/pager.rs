use std::collections::VecDeque;

use crate::grafeas::{Grafeas, ListOccurrencesRequest, Occurrence, Status};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walks a paginated occurrence listing one record at a time.
///
/// Pages are requested lazily and strictly in order.  [`OccurrencePager::next`] returns
/// `Ok(None)` once the listing is exhausted; any error from the service is returned as-is and
/// ends the walk.
pub struct OccurrencePager<'a, C: Grafeas> {
    client: &'a C,
    request: ListOccurrencesRequest,
    buffer: VecDeque<Occurrence>,
    cursor: Cursor,
}

impl<'a, C: Grafeas> OccurrencePager<'a, C> {
    pub fn new(client: &'a C, request: ListOccurrencesRequest) -> Self {
        Self {
            client,
            request,
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Occurrence>, Status> {
        loop {
            if let Some(occurrence) = self.buffer.pop_front() {
                return Ok(Some(occurrence));
            }

            let token = match &self.cursor {
                Cursor::Start => None,
                Cursor::Next(token) => Some(token.as_str()),
                Cursor::Done => return Ok(None),
            };

            let page = match self.client.list_occurrences(&self.request, token).await {
                Ok(page) => page,
                Err(status) => {
                    self.cursor = Cursor::Done;
                    return Err(status);
                }
            };
            log::trace!(
                "{}: fetched page of {} occurrences",
                self.request.parent,
                page.occurrences.len()
            );

            self.buffer.extend(page.occurrences);
            self.cursor = match page.next_page_token {
                Some(token) if !token.is_empty() => Cursor::Next(token),
                _ => Cursor::Done,
            };
        }
    }

    /// Drains the listing.  Nothing gathered so far is returned if any page fails.
    pub async fn collect(mut self) -> Result<Vec<Occurrence>, Status> {
        let mut occurrences = vec![];
        while let Some(occurrence) = self.next().await? {
            occurrences.push(occurrence);
        }
        Ok(occurrences)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::grafeas::{Code, Note, OccurrencePage};

    // Serves canned pages keyed by page token and records the tokens it was asked for.
    struct Pages {
        pages: Vec<Result<OccurrencePage, Status>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl Pages {
        fn new(pages: Vec<Result<OccurrencePage, Status>>) -> Self {
            Self {
                pages,
                seen: Mutex::new(vec![]),
            }
        }
    }

    fn occ(name: &str) -> Occurrence {
        Occurrence {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> Result<OccurrencePage, Status> {
        Ok(OccurrencePage {
            occurrences: names.iter().map(|n| occ(n)).collect(),
            next_page_token: next.map(str::to_string),
        })
    }

    impl Grafeas for Pages {
        async fn list_occurrences(
            &self,
            _request: &ListOccurrencesRequest,
            page_token: Option<&str>,
        ) -> Result<OccurrencePage, Status> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(page_token.map(str::to_string));
            self.pages[seen.len() - 1].clone()
        }

        async fn get_note(&self, _name: &str) -> Result<Note, Status> {
            unimplemented!()
        }

        async fn create_note(&self, _parent: &str, _id: &str, _note: Note) -> Result<Note, Status> {
            unimplemented!()
        }

        async fn delete_note(&self, _name: &str) -> Result<(), Status> {
            unimplemented!()
        }

        async fn create_occurrence(
            &self,
            _parent: &str,
            _occurrence: Occurrence,
        ) -> Result<Occurrence, Status> {
            unimplemented!()
        }

        async fn delete_occurrence(&self, _name: &str) -> Result<(), Status> {
            unimplemented!()
        }
    }

    fn request() -> ListOccurrencesRequest {
        crate::query::list_request("gcr.io/proj/img", crate::grafeas::Kind::PackageVulnerability)
    }

    fn names(occurrences: &[Occurrence]) -> Vec<&str> {
        occurrences.iter().map(|o| o.name.as_str()).collect()
    }

    #[tokio::test]
    async fn follows_tokens_in_order() {
        let client = Pages::new(vec![
            page(&["a", "b"], Some("t1")),
            page(&[], Some("t2")),
            page(&["c"], Some("")),
        ]);
        let all = OccurrencePager::new(&client, request()).collect().await.unwrap();
        assert_eq!(names(&all), vec!["a", "b", "c"]);
        assert_eq!(
            *client.seen.lock().unwrap(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_listing() {
        let client = Pages::new(vec![page(&[], None)]);
        let mut pager = OccurrencePager::new(&client, request());
        assert_eq!(pager.next().await.unwrap(), None);
        // the end marker is sticky and doesn't trigger more calls
        assert_eq!(pager.next().await.unwrap(), None);
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_discards_partial_results() {
        let client = Pages::new(vec![
            page(&["a"], Some("t1")),
            Err(Status::new(Code::Unavailable, "try later")),
        ]);
        let err = OccurrencePager::new(&client, request())
            .collect()
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn pull_one_at_a_time() {
        let client = Pages::new(vec![page(&["a"], Some("t1")), page(&["b"], None)]);
        let mut pager = OccurrencePager::new(&client, request());
        assert_eq!(pager.next().await.unwrap(), Some(occ("a")));
        assert_eq!(client.seen.lock().unwrap().len(), 1);
        assert_eq!(pager.next().await.unwrap(), Some(occ("b")));
        assert_eq!(pager.next().await.unwrap(), None);
        assert_eq!(client.seen.lock().unwrap().len(), 2);
    }
}
