//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full harvest cycle end-to-end.

use listing_harvester::config::{parse_config, Config};
use listing_harvester::crawler::{run_harvest, StopReason};
use listing_harvester::RecordTable;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, csv_path: &Path, workers: u32) -> Config {
    parse_config(&format!(
        r#"
[harvester]
workers = {workers}
queue-capacity = 2

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[fetch]
timeout-secs = 5
connect-timeout-secs = 2

[listing]
url-template = "{base_url}/list?page={{page}}"
item-selector = "div#resultlist > article"
link-selector = "div.header a"
id-attribute = "data-ad-id"

[output]
csv-path = "{csv_path}"

[[rules]]
name = "date"
selector = "div.date"
converter = {{ kind = "date", format = "%d.%m.%Y %H:%M" }}

[[rules]]
name = "overall_price"
selector = "div.price"
converter = {{ kind = "integer" }}
validity = {{ kind = "range", min = 400, max = 800 }}

[[rules]]
name = "rooms"
selector = "div.rooms"
required = false
converter = {{ kind = "integer" }}
validity = {{ kind = "range", min = 2, max = 6 }}

[[rules]]
name = "address"
selector = "div.details span"
text-contains = "Adresse"
next-sibling = true
required = false
accessor = "html"
converter = {{ kind = "normalize" }}

[[rules]]
name = "provision"
selector = "div.details span"
text-contains = "Provision"
next-sibling = true
required = false
persist = false
validity = {{ kind = "predicate", check = "reject" }}
"#,
        csv_path = csv_path.display()
    ))
    .expect("test config must be valid")
}

fn listing_page(base_url: &str, ids: &[u32]) -> String {
    let articles: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<article><div class="header"><a href="{base_url}/ad/{id}" data-ad-id="{id}">Ad {id}</a></div></article>"#
            )
        })
        .collect();
    format!(r#"<html><body><div id="resultlist">{articles}</div></body></html>"#)
}

fn detail_page(date: &str, price: &str, extra: &str) -> String {
    format!(
        r#"<html><body>
        <div class="date">{date}</div>
        <div class="price">{price}</div>
        <div class="rooms">3 Zimmer</div>
        <div class="details">
            <span>Adresse</span><span>Hauptstraße 1<br>1010 Wien</span>
            {extra}
        </div>
        </body></html>"#
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, page: u32, ids: &[u32]) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&server.uri(), ids))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Two listing pages and four ads; page 3 is not mounted and answers 404
///
/// - 103: valid
/// - 102: price out of range
/// - 101: carries a provision
/// - 100: valid, oldest
async fn start_site() -> MockServer {
    let server = MockServer::start().await;

    mount_listing(&server, 1, &[103, 102]).await;
    mount_listing(&server, 2, &[101, 100]).await;

    mount_html(&server, "/ad/103", detail_page("03.03.2019 12:00", "€ 650", "")).await;
    mount_html(&server, "/ad/102", detail_page("02.03.2019 12:00", "€ 1.200", "")).await;
    mount_html(
        &server,
        "/ad/101",
        detail_page(
            "01.03.2019 18:00",
            "€ 500",
            "<span>Provision</span><span>2 Monatsmieten</span>",
        ),
    )
    .await;
    mount_html(&server, "/ad/100", detail_page("01.03.2019 09:30", "€ 420", "")).await;

    server
}

#[tokio::test]
async fn test_full_harvest_single_site() {
    let server = start_site().await;
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("output.csv");

    let config = create_test_config(&server.uri(), &csv_path, 3);
    let summary = run_harvest(config, None).await.expect("harvest should succeed");

    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.stop_reason, Some(StopReason::PageUnavailable));
    assert_eq!(summary.stats.submitted, 4);
    assert_eq!(summary.stats.accepted, 2);
    assert_eq!(summary.stats.rejected, 2);
    assert_eq!(summary.stats.failed, 0);
    assert_eq!(summary.new_records, 2);
    assert_eq!(summary.total_rows, 2);

    let table = RecordTable::load(&csv_path).unwrap();
    assert_eq!(
        table.columns(),
        &["id", "url", "date", "overall_price", "rooms", "address"]
    );

    let newest = table.get("103").unwrap();
    assert_eq!(newest["url"], format!("{}/ad/103", server.uri()));
    assert_eq!(newest["date"], "2019-03-03 12:00:00");
    assert_eq!(newest["overall_price"], "650");
    assert_eq!(newest["rooms"], "3");
    assert_eq!(newest["address"], "Hauptstraße 1 1010 Wien");

    assert_eq!(table.get("100").unwrap()["overall_price"], "420");
    assert!(table.get("102").is_none());
    assert!(table.get("101").is_none());
    assert_eq!(table.latest_id("date"), Some("103"));
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let server = start_site().await;
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("output.csv");

    run_harvest(create_test_config(&server.uri(), &csv_path, 2), None)
        .await
        .unwrap();
    let first_contents = std::fs::read_to_string(&csv_path).unwrap();
    let requests_after_first = server.received_requests().await.unwrap().len();

    let summary = run_harvest(create_test_config(&server.uri(), &csv_path, 2), None)
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::CursorReached));
    assert_eq!(summary.stats.submitted, 0);
    assert_eq!(summary.new_records, 0);
    assert_eq!(summary.total_rows, 2);
    assert_eq!(std::fs::read_to_string(&csv_path).unwrap(), first_contents);

    // Only listing page 1 was requested again.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), requests_after_first + 1);
    assert_eq!(requests.last().unwrap().url.path(), "/list");
}

#[tokio::test]
async fn test_detail_server_error_counts_as_failure() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, &[11, 10]).await;
    mount_html(&server, "/ad/11", detail_page("05.05.2020 08:00", "€ 700", "")).await;
    Mock::given(method("GET"))
        .and(path("/ad/10"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("output.csv");

    let summary = run_harvest(create_test_config(&server.uri(), &csv_path, 1), None)
        .await
        .unwrap();

    assert_eq!(summary.stats.accepted, 1);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.total_rows, 1);
    assert!(RecordTable::load(&csv_path).unwrap().get("11").is_some());
}

#[tokio::test]
async fn test_start_page_override() {
    let server = start_site().await;
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("output.csv");

    let summary = run_harvest(create_test_config(&server.uri(), &csv_path, 2), Some(2))
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.stats.submitted, 2);
    assert_eq!(summary.new_records, 1);

    let table = RecordTable::load(&csv_path).unwrap();
    assert!(table.get("100").is_some());
    assert!(table.get("103").is_none());
}

#[tokio::test]
async fn test_unreachable_site_writes_empty_table() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("output.csv");

    // Port 9 (discard) refuses connections on test machines.
    let summary = run_harvest(create_test_config("http://127.0.0.1:9", &csv_path, 1), None)
        .await
        .unwrap();

    assert_eq!(summary.pages_fetched, 0);
    assert_eq!(summary.stop_reason, Some(StopReason::PageUnavailable));
    assert_eq!(summary.new_records, 0);
    assert!(RecordTable::load(&csv_path).unwrap().is_empty());
}
