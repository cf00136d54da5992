//! Listing page walker
//!
//! Walks listing pages in order and yields the items found on them,
//! newest first, until the source runs out or an item from a previous run
//! shows up.

use crate::config::ListingConfig;
use crate::crawler::fetcher::PageSource;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

/// A detail page waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub detail_url: String,
    pub external_id: String,
}

impl CandidateItem {
    pub fn new(detail_url: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            detail_url: detail_url.into(),
            external_id: external_id.into(),
        }
    }
}

/// Compiled selectors for listing pages
#[derive(Debug)]
struct ListingSelectors {
    item: Selector,
    link: Selector,
    id_attribute: String,
}

impl ListingSelectors {
    fn new(config: &ListingConfig) -> Option<Self> {
        Some(Self {
            item: Selector::parse(&config.item_selector).ok()?,
            link: Selector::parse(&config.link_selector).ok()?,
            id_attribute: config.id_attribute.clone(),
        })
    }
}

/// Why the walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The item matching the cursor was reached
    CursorReached,
    /// A listing page could not be fetched
    PageUnavailable,
    /// A listing page had no new items
    Exhausted,
    /// The configured page limit was hit
    PageLimit,
}

/// Lazily walks listing pages and yields candidate items
///
/// # Example
///
/// ```no_run
/// # use listing_harvester::config::ListingConfig;
/// # use listing_harvester::crawler::{HttpSource, ListingCrawler};
/// # use std::sync::Arc;
/// # async fn example(source: Arc<HttpSource>, listing: &ListingConfig) {
/// let mut crawler = ListingCrawler::new(source, listing, 1, Some("1234".to_string()));
/// while let Some(item) = crawler.next_item().await {
///     println!("{} -> {}", item.external_id, item.detail_url);
/// }
/// # }
/// ```
pub struct ListingCrawler<S: PageSource> {
    source: Arc<S>,
    listing: ListingConfig,
    selectors: Option<ListingSelectors>,
    page: u32,
    pages_fetched: u32,
    max_pages: Option<u32>,
    cursor: Option<String>,
    pending: VecDeque<CandidateItem>,
    yielded: HashSet<String>,
    stop_reason: Option<StopReason>,
}

impl<S: PageSource> ListingCrawler<S> {
    /// Creates a crawler starting at `start_page`
    ///
    /// `cursor` is the external id of the newest item stored by a previous
    /// run; `None` on a first run.
    pub fn new(
        source: Arc<S>,
        listing: &ListingConfig,
        start_page: u32,
        cursor: Option<String>,
    ) -> Self {
        Self {
            source,
            listing: listing.clone(),
            selectors: ListingSelectors::new(listing),
            page: start_page,
            pages_fetched: 0,
            max_pages: None,
            cursor,
            pending: VecDeque::new(),
            yielded: HashSet::new(),
            stop_reason: None,
        }
    }

    /// Caps the number of listing pages fetched
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Returns the next item, or `None` once the walk has ended
    pub async fn next_item(&mut self) -> Option<CandidateItem> {
        loop {
            if self.stop_reason.is_some() {
                return None;
            }

            if let Some(item) = self.pending.pop_front() {
                if self.cursor.as_deref() == Some(item.external_id.as_str()) {
                    tracing::info!(
                        "Reached item {} from a previous run, stopping",
                        item.external_id
                    );
                    return self.stop(StopReason::CursorReached);
                }
                if !self.yielded.insert(item.external_id.clone()) {
                    tracing::debug!("Item {} already listed this run", item.external_id);
                    continue;
                }
                return Some(item);
            }

            if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
                tracing::info!("Page limit of {} reached", self.pages_fetched);
                return self.stop(StopReason::PageLimit);
            }

            let url = self.listing.page_url(self.page);
            let body = match self.source.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::info!("Listing page {} unavailable ({}), stopping", self.page, e);
                    return self.stop(StopReason::PageUnavailable);
                }
            };
            self.pages_fetched += 1;

            let items = match &self.selectors {
                Some(selectors) => parse_listing(&body, &url, selectors),
                None => Vec::new(),
            };
            let fresh = items
                .iter()
                .filter(|item| !self.yielded.contains(&item.external_id))
                .count();
            tracing::debug!(
                "Listing page {}: {} items ({} new this run)",
                self.page,
                items.len(),
                fresh
            );

            if fresh == 0 {
                tracing::info!("Listing page {} has no new items, stopping", self.page);
                return self.stop(StopReason::Exhausted);
            }

            self.pending.extend(items);
            self.page += 1;
        }
    }

    fn stop(&mut self, reason: StopReason) -> Option<CandidateItem> {
        self.pending.clear();
        self.stop_reason = Some(reason);
        None
    }

    /// Why the walk ended; `None` while items may still come
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Number of listing pages fetched successfully
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}

/// Extracts the items of one listing page in document order
fn parse_listing(body: &str, page_url: &str, selectors: &ListingSelectors) -> Vec<CandidateItem> {
    let document = Html::parse_document(body);
    let base_url = Url::parse(page_url).ok();

    document
        .select(&selectors.item)
        .filter_map(|element| parse_item(element, base_url.as_ref(), selectors))
        .collect()
}

fn parse_item(
    element: ElementRef<'_>,
    base_url: Option<&Url>,
    selectors: &ListingSelectors,
) -> Option<CandidateItem> {
    let Some(link) = element.select(&selectors.link).next() else {
        tracing::debug!("Listing item without a detail link, skipping");
        return None;
    };

    let href = link.value().attr("href").and_then(|href| resolve_link(href, base_url));
    let id = link
        .value()
        .attr(&selectors.id_attribute)
        .or_else(|| element.value().attr(&selectors.id_attribute))
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match (href, id) {
        (Some(href), Some(id)) => Some(CandidateItem::new(href, id)),
        _ => {
            tracing::debug!("Listing item without href or id, skipping");
            None
        }
    }
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None for empty hrefs, fragment-only links, and anything that does
/// not resolve to http or https.
fn resolve_link(href: &str, base_url: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute = match base_url {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}
