//! Client for the remote mod catalog.
//!
//! Builds the two queries the tracker needs (mod summaries filtered by id and a
//! mod's version list) and normalizes the JSON:API-style responses into
//! [`ModSummary`] and [`VersionRecord`]. Missing or malformed fields become
//! `None`; entries without an id are dropped.

use super::fetcher::{CatalogError, CatalogRequest, RateLimitedFetcher};
use crate::models::{ModSummary, VersionRecord};
use serde_json::Value;
use std::future::Future;

/// Fields requested for mod summaries
pub const SUMMARY_FIELDS: &str = "id,name,detail_url";

/// Fields requested for version records
pub const VERSION_FIELDS: &str = "id,version,spt_version_constraint";

/// Upper bound on pages walked by [`CatalogClient::list_all_summaries`]
const MAX_PAGES: u32 = 100;

/// One page of mod summaries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryPage {
    pub mods: Vec<ModSummary>,
    pub has_next_page: bool,
}

/// One page of a mod's version list, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPage {
    pub versions: Vec<VersionRecord>,
    pub has_next_page: bool,
}

/// What the tracker needs from a catalog.
///
/// [`CatalogClient`] is the HTTP implementation; tests substitute an
/// in-memory one.
pub trait CatalogSource: Send + Sync + 'static {
    /// Summaries for every id the catalog knows, across all pages
    fn fetch_summaries(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<ModSummary>, CatalogError>> + Send;

    /// The newest version record of one mod, if it has any
    fn latest_version(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<VersionRecord>, CatalogError>> + Send;
}

pub struct CatalogClient {
    fetcher: RateLimitedFetcher,
}

impl CatalogClient {
    pub fn new(fetcher: RateLimitedFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    /// One page of summaries for the given ids
    pub async fn list_summaries(&self, ids: &[String], page: u32) -> Result<SummaryPage, CatalogError> {
        if ids.is_empty() {
            return Ok(SummaryPage::default());
        }

        let request = CatalogRequest::new("mods")
            .param("page", page.to_string())
            .param("filter[id]", ids.join(","))
            .param("fields", SUMMARY_FIELDS);
        let body = self.fetcher.fetch(&request).await?;

        let mods = data_items(&body).filter_map(parse_summary).collect();
        Ok(SummaryPage {
            mods,
            has_next_page: has_next_page(&body),
        })
    }

    /// Every summary for the given ids, walking pages until exhausted
    pub async fn list_all_summaries(&self, ids: &[String]) -> Result<Vec<ModSummary>, CatalogError> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let result = self.list_summaries(ids, page).await?;
            all.extend(result.mods);

            if !result.has_next_page {
                break;
            }
            if page >= MAX_PAGES {
                tracing::warn!("Stopped paging mod summaries after {} pages", MAX_PAGES);
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    /// One page of a mod's version list.
    ///
    /// The id becomes a path segment, so ids with characters outside the URL
    /// unreserved set are rejected before any request is sent.
    pub async fn list_versions(&self, id: &str, page: u32) -> Result<VersionPage, CatalogError> {
        if !is_path_safe_id(id) {
            return Err(CatalogError::InvalidId { id: id.to_string() });
        }

        let request = CatalogRequest::new(format!("mod/{id}/versions"))
            .param("page", page.to_string())
            .param("fields", VERSION_FIELDS);
        let body = self.fetcher.fetch(&request).await?;

        let versions = data_items(&body).map(parse_version).collect();
        Ok(VersionPage {
            versions,
            has_next_page: has_next_page(&body),
        })
    }
}

impl CatalogSource for CatalogClient {
    async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<ModSummary>, CatalogError> {
        self.list_all_summaries(ids).await
    }

    async fn latest_version(&self, id: &str) -> Result<Option<VersionRecord>, CatalogError> {
        let page = self.list_versions(id, 1).await?;
        Ok(page.versions.into_iter().next())
    }
}

fn is_path_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        && id != "."
        && id != ".."
}

fn data_items(body: &Value) -> impl Iterator<Item = &Value> {
    let items = body.get("data").and_then(Value::as_array);
    if items.is_none() {
        tracing::debug!("Catalog response has no data array");
    }
    items.into_iter().flatten()
}

/// Strings pass through, numbers are rendered, blanks and anything else are absent
fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_summary(item: &Value) -> Option<ModSummary> {
    let Some(id) = text_field(item, "id") else {
        tracing::warn!("Dropping catalog entry without an id: {}", item);
        return None;
    };

    Some(ModSummary {
        name: text_field(item, "name").unwrap_or_default(),
        catalog_url: text_field(item, "detail_url"),
        compatibility_version: None,
        package_version: None,
        id,
    })
}

pub(crate) fn parse_version(item: &Value) -> VersionRecord {
    VersionRecord {
        id: text_field(item, "id"),
        version: text_field(item, "version"),
        compatibility_constraint: text_field(item, "spt_version_constraint"),
    }
}

/// `meta.current_page < meta.last_page`, else a non-null `links.next`
pub(crate) fn has_next_page(body: &Value) -> bool {
    let meta = body.get("meta");
    let current = meta.and_then(|m| m.get("current_page")).and_then(Value::as_u64);
    let last = meta.and_then(|m| m.get("last_page")).and_then(Value::as_u64);

    if let (Some(current), Some(last)) = (current, last) {
        return current < last;
    }

    body.get("links")
        .and_then(|l| l.get("next"))
        .and_then(Value::as_str)
        .is_some()
}
