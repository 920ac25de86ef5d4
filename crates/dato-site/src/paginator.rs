//! Multi-page collection fetching.

use crate::Result;
use dato_core::client::DEFAULT_PAGE_SIZE;
use dato_core::query::QueryParams;
use dato_core::{Error, Request, Transport};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Query parameter carrying the page size.
pub const PAGE_LIMIT: &str = "page[limit]";

/// Query parameter carrying the number of records to skip.
pub const PAGE_OFFSET: &str = "page[offset]";

/// Fetches every page of a collection and merges them into one document.
///
/// Pages are requested one after the other; the first failing request aborts the whole
/// fetch and its error is returned as is. A page that starts with a record already fetched
/// ends the fetch and is discarded.
pub struct Paginator<'a> {
    transport: &'a dyn Transport,
    path: String,
    query: QueryParams,
    page_size: usize,
}

impl<'a> Paginator<'a> {
    /// Create a paginator for the collection at `path`.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, path: impl Into<String>, query: QueryParams) -> Self {
        Self {
            transport,
            path: path.into(),
            query,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the number of records requested per page (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch all pages.
    ///
    /// The merged document is the first page with `data` replaced by every page's items in
    /// fetch order, `included` replaced by the union of every page's side-loaded entities
    /// (first occurrence of each `(type, id)` kept), and page `links` dropped.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the first failed page, or
    /// [`Error::Deserialization`] if a page is not a document with a `data` array.
    pub async fn fetch_all(&self) -> Result<Value> {
        let mut base: Option<Map<String, Value>> = None;
        let mut total: Option<u64> = None;
        let mut items = Vec::new();
        let mut included = Vec::new();
        let mut seen = HashSet::new();
        let mut fetched = HashSet::new();
        let mut has_included = false;
        let mut page_number = 0usize;

        loop {
            let offset = items.len();
            let mut query = self.query.clone();
            query.set(PAGE_LIMIT, self.page_size);
            if offset > 0 {
                query.set(PAGE_OFFSET, offset);
            }

            debug!(
                path = %self.path,
                page = page_number,
                offset,
                limit = self.page_size,
                "Fetching page"
            );
            let response = self
                .transport
                .request(Request::get(self.path.as_str(), query))
                .await?;

            let Value::Object(mut page) = response else {
                return Err(Error::Deserialization(format!(
                    "page {page_number} of `{}` is not a JSON:API document",
                    self.path
                )));
            };
            let Some(Value::Array(data)) = page.remove("data") else {
                return Err(Error::Deserialization(format!(
                    "page {page_number} of `{}` has no `data` array",
                    self.path
                )));
            };

            if data
                .first()
                .and_then(entity_key)
                .is_some_and(|key| fetched.contains(&key))
            {
                warn!(
                    path = %self.path,
                    page = page_number,
                    offset,
                    "Page repeats fetched records, stopping"
                );
                break;
            }
            fetched.extend(data.iter().filter_map(entity_key));

            if let Some(Value::Array(entities)) = page.remove("included") {
                has_included = true;
                for entity in entities {
                    if entity_key(&entity).map_or(true, |key| seen.insert(key)) {
                        included.push(entity);
                    }
                }
            }

            let next = page
                .get("links")
                .and_then(Value::as_object)
                .map(|links| links.get("next").is_some_and(|next| !next.is_null()));

            if base.is_none() {
                total = page
                    .get("meta")
                    .and_then(|meta| meta.get("total_count"))
                    .and_then(Value::as_u64);
                base = Some(page);
            }

            let count = data.len();
            items.extend(data);

            let more = if count == 0 {
                false
            } else if let Some(total) = total {
                (items.len() as u64) < total
            } else if let Some(next) = next {
                next
            } else {
                count == self.page_size
            };

            if !more {
                break;
            }
            page_number += 1;
        }

        debug!(
            path = %self.path,
            pages = page_number + 1,
            items = items.len(),
            "Fetched all pages"
        );

        let mut merged = base.unwrap_or_default();
        merged.remove("links");
        merged.insert("data".to_string(), Value::Array(items));
        if has_included {
            merged.insert("included".to_string(), Value::Array(included));
        }
        Ok(Value::Object(merged))
    }
}

fn entity_key(entity: &Value) -> Option<(String, String)> {
    let kind = entity.get("type")?.as_str()?.to_string();
    let id = match entity.get("id")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    Some((kind, id))
}
