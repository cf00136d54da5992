//! Harvest coordinator - main run orchestration logic
//!
//! This module ties the pieces of a run together:
//! - Loading the prior table and deriving the crawl cursor
//! - Starting the worker pool with the detail page handler
//! - Feeding listing items into the pool until the walk stops
//! - Draining the pool, merging accepted records, and writing the table

use crate::config::Config;
use crate::crawler::fetcher::{HttpSource, PageSource};
use crate::crawler::listing::{CandidateItem, ListingCrawler, StopReason};
use crate::crawler::pool::{ItemHandler, PoolError, WorkerPool};
use crate::extract::{Record, Rejection, RuleSet};
use crate::output::{HarvestStats, RecordTable, ResultSink, StatsSnapshot};
use crate::HarvestError;
use scraper::Html;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one harvest run
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    /// Item counters at the end of the run
    pub stats: StatsSnapshot,

    /// Records accepted in this run
    pub new_records: usize,

    /// Rows in the table after merging
    pub total_rows: usize,

    /// Listing pages fetched
    pub pages_fetched: u32,

    /// Why the listing walk ended
    pub stop_reason: Option<StopReason>,

    pub elapsed: Duration,
}

/// Fetches a detail page and runs the rule set against it
struct DetailHandler<S: PageSource> {
    source: Arc<S>,
    rules: Arc<RuleSet>,
    sink: Arc<ResultSink>,
    stats: Arc<HarvestStats>,
}

impl<S: PageSource> ItemHandler<CandidateItem> for DetailHandler<S> {
    async fn handle(&self, item: CandidateItem) -> Result<(), HarvestError> {
        let body = match self.source.fetch(&item.detail_url).await {
            Ok(body) => body,
            Err(e) => {
                self.stats.record_failed();
                return Err(e.into());
            }
        };

        match extract_from_body(&self.rules, &body, &item) {
            Ok(record) => {
                tracing::debug!("Accepted item {}", item.external_id);
                self.sink.accept(record);
                self.stats.record_accepted();
                Ok(())
            }
            Err(rejection) => {
                if rejection.is_parse_failure() {
                    self.stats.record_failed();
                } else {
                    self.stats.record_rejected();
                }
                Err(HarvestError::Extraction {
                    url: item.detail_url,
                    source: rejection,
                })
            }
        }
    }
}

/// Parses and extracts in one synchronous step; `Html` never crosses an await.
fn extract_from_body(rules: &RuleSet, body: &str, item: &CandidateItem) -> Result<Record, Rejection> {
    let document = Html::parse_document(body);
    rules.extract(&document, item)
}

/// Runs harvests against one page source
pub struct Harvester<S: PageSource> {
    config: Config,
    source: Arc<S>,
    rules: Arc<RuleSet>,
}

impl<S: PageSource> Harvester<S> {
    /// Creates a harvester, compiling the rule table
    ///
    /// # Errors
    ///
    /// * `HarvestError::Config` - The rule table does not compile
    pub fn new(config: Config, source: S) -> Result<Self, HarvestError> {
        let rules = RuleSet::compile(&config.rules)?;
        Ok(Self {
            config,
            source: Arc::new(source),
            rules: Arc::new(rules),
        })
    }

    /// Runs one incremental harvest starting at listing page `start_page`
    ///
    /// # Errors
    ///
    /// Only startup and persistence failures are returned: an unreadable
    /// prior table or a failed write. Per-item failures are logged and
    /// counted.
    pub async fn run(&self, start_page: u32) -> Result<HarvestSummary, HarvestError> {
        let start_time = Instant::now();
        let csv_path = Path::new(&self.config.output.csv_path);
        let order_column = self.config.output.order_column.as_str();

        let prior = RecordTable::load(csv_path)?;
        let cursor = prior.latest_id(order_column).map(str::to_string);
        match &cursor {
            Some(id) => tracing::info!("Newest stored item: {}", id),
            None => tracing::info!("No stored items, walking every listing page"),
        }

        let sink = Arc::new(ResultSink::new());
        let stats = Arc::new(HarvestStats::new());
        let handler = DetailHandler {
            source: Arc::clone(&self.source),
            rules: Arc::clone(&self.rules),
            sink: Arc::clone(&sink),
            stats: Arc::clone(&stats),
        };

        let pool = WorkerPool::new(
            self.config.harvester.workers as usize,
            self.config.harvester.queue_capacity as usize,
            handler,
        );

        let mut crawler = ListingCrawler::new(
            Arc::clone(&self.source),
            &self.config.listing,
            start_page,
            cursor,
        )
        .with_max_pages(self.config.harvester.max_pages);

        while let Some(item) = crawler.next_item().await {
            let submitted = stats.record_submitted();
            tracing::debug!("Queueing item {}: {}", item.external_id, item.detail_url);

            if let Err(e) = pool.submit(item).await {
                tracing::error!("Cannot queue more items: {}", e);
                break;
            }

            if submitted % 25 == 0 {
                let snapshot = stats.snapshot();
                tracing::info!(
                    "Progress: {} items queued, {} done, {} accepted",
                    snapshot.submitted,
                    snapshot.completed(),
                    snapshot.accepted
                );
            }
        }

        pool.shutdown().await;

        let sink = Arc::try_unwrap(sink).map_err(|_| PoolError::StillShared)?;
        let new_records = sink.len();
        let table = sink.finalize(prior, &self.rules.persisted_columns());
        table.write(csv_path, order_column)?;

        let summary = HarvestSummary {
            stats: stats.snapshot(),
            new_records,
            total_rows: table.len(),
            pages_fetched: crawler.pages_fetched(),
            stop_reason: crawler.stop_reason().cloned(),
            elapsed: start_time.elapsed(),
        };

        tracing::info!(
            "Harvest completed in {:?}: {} ({} rows stored)",
            summary.elapsed,
            summary.stats,
            summary.total_rows
        );

        Ok(summary)
    }
}

/// Runs a complete harvest over HTTP
///
/// This is the main entry point for a run. It will:
/// 1. Compile the rule table
/// 2. Build the HTTP client
/// 3. Load the prior table and find the newest stored item
/// 4. Walk listing pages, feeding items to the worker pool
/// 5. Merge the accepted records and write the table
///
/// `start_page` overrides `[harvester] start-page`.
///
/// # Example
///
/// ```no_run
/// use listing_harvester::config::load_config;
/// use listing_harvester::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config, None).await?;
/// println!("{} new records", summary.new_records);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    start_page: Option<u32>,
) -> Result<HarvestSummary, HarvestError> {
    let source = HttpSource::new(&config.user_agent, &config.fetch)?;
    let start_page = start_page.unwrap_or(config.harvester.start_page);
    let harvester = Harvester::new(config, source)?;
    harvester.run(start_page).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::fetcher::FetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSite {
        pages: Mutex<HashMap<String, String>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn put(&self, url: &str, body: String) {
            self.pages.lock().unwrap().insert(url.to_string(), body);
        }
    }

    impl PageSource for Arc<FakeSite> {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            let page = self.pages.lock().unwrap().get(url).cloned();
            page.ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn config(csv_path: &str) -> Config {
        parse_config(&format!(
            r##"
[harvester]
workers = 3
queue-capacity = 2

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[listing]
url-template = "https://site.test/list?page={{page}}"
item-selector = "article"
link-selector = "a"
id-attribute = "data-ad-id"

[output]
csv-path = "{csv_path}"

[[rules]]
name = "date"
selector = "#date"
converter = {{ kind = "date", format = "%d.%m.%Y %H:%M" }}

[[rules]]
name = "price"
selector = "#price"
converter = {{ kind = "integer" }}
validity = {{ kind = "range", min = 400, max = 800 }}
"##
        ))
        .unwrap()
    }

    fn listing_page(ids: &[u32]) -> String {
        ids.iter()
            .map(|id| format!(r#"<article><a href="/ad/{id}" data-ad-id="{id}">{id}</a></article>"#))
            .collect()
    }

    fn detail_page(day: u32, price: &str) -> String {
        format!(r#"<span id="date">{day:02}.03.2019 10:00</span><span id="price">{price}</span>"#)
    }

    /// Two listing pages, five ads; ad 4 is too expensive, ad 2 has no price
    /// text that parses, ad 1 has no detail page.
    fn site() -> Arc<FakeSite> {
        let site = Arc::new(FakeSite::default());
        site.put("https://site.test/list?page=1", listing_page(&[5, 4, 3]));
        site.put("https://site.test/list?page=2", listing_page(&[2, 1]));
        site.put("https://site.test/ad/5", detail_page(5, "€ 650"));
        site.put("https://site.test/ad/4", detail_page(4, "€ 990"));
        site.put("https://site.test/ad/3", detail_page(3, "€ 500"));
        site.put("https://site.test/ad/2", detail_page(2, "auf Anfrage"));
        site
    }

    #[tokio::test]
    async fn test_first_run_then_idempotent_second_run() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("output.csv");
        let site = site();
        let harvester =
            Harvester::new(config(csv_path.to_str().unwrap()), Arc::clone(&site)).unwrap();

        let first = harvester.run(1).await.unwrap();
        assert_eq!(first.new_records, 2);
        assert_eq!(first.total_rows, 2);
        assert_eq!(first.stats.submitted, 5);
        assert_eq!(first.stats.accepted, 2);
        assert_eq!(first.stats.rejected, 1);
        assert_eq!(first.stats.failed, 2);
        assert_eq!(first.pages_fetched, 2);
        assert_eq!(first.stop_reason, Some(StopReason::PageUnavailable));

        let table = RecordTable::load(&csv_path).unwrap();
        assert_eq!(table.get("5").unwrap()["price"], "650");
        assert_eq!(table.get("3").unwrap()["date"], "2019-03-03 10:00:00");
        assert!(table.get("4").is_none());
        assert_eq!(table.latest_id("date"), Some("5"));

        site.requests.lock().unwrap().clear();
        let second = harvester.run(1).await.unwrap();
        assert_eq!(second.new_records, 0);
        assert_eq!(second.total_rows, 2);
        assert_eq!(second.stop_reason, Some(StopReason::CursorReached));
        // Only the first listing page is fetched; no detail pages at all.
        assert_eq!(
            *site.requests.lock().unwrap(),
            vec!["https://site.test/list?page=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_new_items_merged_ahead_of_cursor() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("output.csv");
        let site = site();
        let harvester =
            Harvester::new(config(csv_path.to_str().unwrap()), Arc::clone(&site)).unwrap();
        harvester.run(1).await.unwrap();

        // Two new ads appear at the top of the listing.
        site.put("https://site.test/list?page=1", listing_page(&[7, 6, 5]));
        site.put("https://site.test/list?page=2", listing_page(&[4, 3, 2]));
        site.put("https://site.test/ad/7", detail_page(7, "€ 700"));
        site.put("https://site.test/ad/6", detail_page(6, "€ 450"));

        let summary = harvester.run(1).await.unwrap();
        assert_eq!(summary.new_records, 2);
        assert_eq!(summary.stats.submitted, 2);
        assert_eq!(summary.total_rows, 4);

        let table = RecordTable::load(&csv_path).unwrap();
        assert_eq!(table.latest_id("date"), Some("7"));
    }

    #[tokio::test]
    async fn test_corrupt_prior_table_fails_before_crawling() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("output.csv");
        std::fs::write(&csv_path, "url,date\nhttps://site.test/ad/1,x\n").unwrap();

        let site = site();
        let harvester =
            Harvester::new(config(csv_path.to_str().unwrap()), Arc::clone(&site)).unwrap();

        let result = harvester.run(1).await;
        assert!(matches!(result, Err(HarvestError::Table(_))));
        assert!(site.requests.lock().unwrap().is_empty());
    }
}
