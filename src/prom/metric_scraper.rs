use log::{debug, info};
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio::sync::mpsc;

use super::parser::TextDecoder;
use super::MetricFamily;
use crate::error::{Error, Result};

/// Families decoded ahead of the collecting side before the download blocks.
pub const QUEUE_CAPACITY: usize = 1024;

const ACCEPT_TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Scrapes one exposition endpoint.
///
/// Certificate verification is disabled, metrics endpoints of storage servers
/// are usually served with self-signed certificates.
#[derive(Debug, Clone)]
pub struct MetricScraper {
    endpoint: String,
    client: Client,
}

impl MetricScraper {
    pub fn new(endpoint: impl Into<String>) -> Result<MetricScraper> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|source| Error::Http {
                url: endpoint.clone(),
                source,
            })?;
        Ok(MetricScraper { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches and decodes every family of the endpoint.
    ///
    /// The download and decoding run in their own task and hand families over
    /// a bounded queue. Any transport or decode error fails the whole fetch,
    /// families received before the failure are discarded.
    pub async fn fetch(&self) -> Result<Vec<MetricFamily>> {
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        let producer = tokio::spawn(scrape(self.client.clone(), self.endpoint.clone(), tx));

        let mut families = Vec::new();
        while let Some(family) = rx.recv().await {
            families.push(family);
        }
        producer.await??;

        info!(
            "Fetched {} metric families from {}",
            families.len(),
            self.endpoint
        );
        Ok(families)
    }
}

async fn scrape(client: Client, url: String, tx: mpsc::Sender<MetricFamily>) -> Result<()> {
    debug!("GET {url}");
    let mut response = client
        .get(&url)
        .header(ACCEPT, ACCEPT_TEXT_FORMAT)
        .send()
        .await
        .map_err(|source| Error::Http {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status { url, status });
    }

    let mut decoder = TextDecoder::new();
    while let Some(chunk) = response.chunk().await.map_err(|source| Error::Http {
        url: url.clone(),
        source,
    })? {
        for family in decoder.push(&chunk)? {
            if tx.send(family).await.is_err() {
                debug!("Collector for {url} went away, stopping scrape");
                return Ok(());
            }
        }
    }
    for family in decoder.finish()? {
        if tx.send(family).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prom::test_data::MINIO_METRICS;
    use crate::prom::MetricType;
    use assert_matches::assert_matches;
    use mockito::Server;

    const METRICS_PATH: &str = "/minio/prometheus/metrics";

    #[tokio::test]
    async fn test_fetch_decodes_all_families() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", METRICS_PATH)
            .match_header("accept", ACCEPT_TEXT_FORMAT)
            .with_status(200)
            .with_header("content-type", "text/plain; version=0.0.4")
            .with_body(MINIO_METRICS)
            .create_async()
            .await;

        let scraper = MetricScraper::new(format!("{}{METRICS_PATH}", server.url())).unwrap();
        let families = scraper.fetch().await.unwrap();

        mock.assert_async().await;
        assert_eq!(families.len(), 45);
        assert_eq!(families[0].name, "go_gc_duration_seconds");
        assert_eq!(
            families.last().map(|f| f.name.as_str()),
            Some("promhttp_metric_handler_requests_total")
        );
        assert!(families
            .iter()
            .any(|f| f.metric_type == MetricType::Histogram));
    }

    fn generated_body(families: usize) -> String {
        (0..families)
            .map(|i| format!("# TYPE generated_{i} gauge\ngenerated_{i} {i}\n"))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_more_families_than_queue() {
        let count = QUEUE_CAPACITY * 3 + 17;
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", METRICS_PATH)
            .with_status(200)
            .with_body(generated_body(count))
            .create_async()
            .await;

        let scraper = MetricScraper::new(format!("{}{METRICS_PATH}", server.url())).unwrap();
        let families = scraper.fetch().await.unwrap();

        assert_eq!(families.len(), count);
        for (i, family) in families.iter().enumerate() {
            assert_eq!(family.name, format!("generated_{i}"));
        }
    }

    #[tokio::test]
    async fn test_scrape_waits_for_full_queue() {
        let count = QUEUE_CAPACITY * 2;
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", METRICS_PATH)
            .with_status(200)
            .with_body(generated_body(count))
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        let url = format!("{}{METRICS_PATH}", server.url());
        let producer = tokio::spawn(scrape(Client::new(), url, tx));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!producer.is_finished());

        let mut names = Vec::new();
        while let Some(family) = rx.recv().await {
            names.push(family.name);
        }
        producer.await.unwrap().unwrap();

        assert_eq!(names.len(), count);
        assert_eq!(names[0], "generated_0");
        assert_eq!(names[count - 1], format!("generated_{}", count - 1));
    }

    #[tokio::test]
    async fn test_fetch_fails_on_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", METRICS_PATH)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let scraper = MetricScraper::new(format!("{}{METRICS_PATH}", server.url())).unwrap();
        let result = scraper.fetch().await;

        assert_matches!(result, Err(Error::Status { status, .. }) if status.as_u16() == 503);
    }

    #[tokio::test]
    async fn test_fetch_fails_on_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", METRICS_PATH)
            .with_status(200)
            .with_body("good_metric 1\nbad_metric not-a-number\n")
            .create_async()
            .await;

        let scraper = MetricScraper::new(format!("{}{METRICS_PATH}", server.url())).unwrap();
        let result = scraper.fetch().await;

        assert_matches!(result, Err(Error::Parse { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_fetch_fails_when_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let scraper = MetricScraper::new(format!("http://{addr}{METRICS_PATH}")).unwrap();
        let result = scraper.fetch().await;

        assert_matches!(result, Err(Error::Http { .. }));
    }
}
