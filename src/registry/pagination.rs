//! Cursor pagination for catalog and tag listings
//!
//! The V2 API pages `_catalog` and `tags/list` with a `last`/`n` cursor. The
//! walk keeps asking for the next page until the server stops handing out a
//! cursor, and either returns every item or fails as a whole.

use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use std::collections::HashSet;
use std::future::Future;
use url::Url;

/// Continuation point returned by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// Last item of the previous page
    pub last: String,
    /// Page size
    pub n: u32,
}

impl Cursor {
    pub fn new(last: impl Into<String>, n: u32) -> Self {
        Self {
            last: last.into(),
            n,
        }
    }

    /// A cursor only exists when the body carried both markers
    pub fn from_parts(last: Option<String>, n: Option<u32>) -> Option<Self> {
        match (last, n) {
            (Some(last), Some(n)) if !last.is_empty() => Some(Self { last, n }),
            _ => None,
        }
    }

    /// Extract the cursor from an RFC 5988 `Link` header with `rel="next"`,
    /// e.g. `</v2/_catalog?last=b&n=2>; rel="next"`.
    pub fn from_link_header(header: &str) -> Option<Self> {
        let base = Url::parse("http://registry.invalid/").ok()?;

        header.split(',').find_map(|link| {
            let mut parts = link.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim().replace(' ', "");
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }

            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            let url = base.join(target).ok()?;
            let mut last = None;
            let mut n = None;
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "last" => last = Some(value.into_owned()),
                    "n" => n = value.parse().ok(),
                    _ => {}
                }
            }
            Self::from_parts(last, n)
        })
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<Cursor>) -> Self {
        Self { items, next }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

/// Walk a paginated listing to completion.
///
/// `fetch_page` is called with `None` first and then with each cursor the
/// previous page returned. Items are accumulated in page order. Any page error
/// fails the walk with [`RegistryError::PageFetch`]; callers that want to treat
/// a particular failure as an empty page must do so inside `fetch_page`.
///
/// A server that hands back any cursor already requested (the one just sent,
/// or an earlier one in a cycle) is treated as having reached the end of the
/// listing; no page is requested twice.
pub async fn paginate<T, F, Fut>(resource: &str, logger: &Logger, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<Cursor> = None;
    let mut requested: HashSet<Cursor> = HashSet::new();
    let mut page_number = 1;

    loop {
        if let Some(current) = &cursor {
            requested.insert(current.clone());
        }
        let page = fetch_page(cursor.take())
            .await
            .map_err(|e| RegistryError::page_fetch(resource, page_number, e))?;

        logger.trace(&format!(
            "{} page {}: {} item(s)",
            resource,
            page_number,
            page.items.len()
        ));
        items.extend(page.items);

        match page.next {
            Some(next) if requested.contains(&next) => {
                logger.warning(&format!(
                    "Registry repeated cursor last={} for {}; stopping after page {}",
                    next.last, resource, page_number
                ));
                break;
            }
            Some(next) => {
                cursor = Some(next);
                page_number += 1;
            }
            None => break,
        }
    }

    Ok(items)
}
