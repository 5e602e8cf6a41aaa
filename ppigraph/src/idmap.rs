//! Batch identifier mapping against the UniProt REST service.
//!
//! A mapping is a three step conversation: submit the job, poll
//! its status until the service reports it finished, then fetch
//! the results. The poll uses a doubling backoff with a hard
//! deadline rather than a fixed sleep, so a slow or dead
//! service surfaces as a `Timeout` instead of hanging.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The UniProt id mapping endpoint.
pub const UNIPROT_IDMAPPING_URL: &str = "https://rest.uniprot.org/idmapping";

/// Source database name for UniProt accessions.
pub const UNIPROT_ACCESSION_DB: &str = "UniProtKB_AC-ID";
/// Destination database name for gene names.
pub const GENE_NAME_DB: &str = "Gene_Name";

/// Error type for the id mapping conversation.
#[derive(Error, Debug)]
pub enum IdMapError {
    #[error("Problem talking to the id mapping service: {0}")]
    Http(#[from] reqwest::Error),
    #[error("The id mapping service returned {0}.")]
    Service(StatusCode),
    #[error("Id mapping job {job} did not finish within {waited:?}.")]
    Timeout { job: String, waited: Duration },
    #[error("Unexpected response shape: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(rename = "jobStatus")]
    job_status: Option<String>,
    // a finished job may skip the status field and answer with
    // results directly.
    results: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    results: Vec<MappedPair>,
}

#[derive(Debug, Deserialize)]
struct MappedPair {
    from: String,
    // a plain string for simple targets (gene names), an object
    // holding the full entry otherwise.
    to: Value,
}

/// How long to sleep before the next status poll: double the
/// last interval, capped at five seconds.
fn next_interval(interval: Duration) -> Duration {
    (interval * 2).min(Duration::from_secs(5))
}

/// A blocking client for the id mapping service.
pub struct IdMapClient {
    client: Client,
    base_url: String,
    first_interval: Duration,
    max_wait: Duration,
}

impl Default for IdMapClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IdMapClient {
    /// A client against the real UniProt endpoint.
    pub fn new() -> Self {
        Self::with_base_url(UNIPROT_IDMAPPING_URL)
    }

    /// A client against an arbitrary endpoint. Used by tests to
    /// point at a local stub.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            first_interval: Duration::from_millis(250),
            max_wait: Duration::from_secs(60),
        }
    }

    /// Override the polling deadline.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Map `ids` from one database namespace to another,
    /// e.g. UniProt accessions to gene names. Returns the
    /// (from, to) pairs the service resolved; unresolved ids are
    /// simply absent.
    pub fn map_ids(
        &self,
        from_db: &str,
        to_db: &str,
        ids: &[String],
    ) -> Result<Vec<(String, String)>, IdMapError> {
        let job = self.submit(from_db, to_db, ids)?;
        self.wait_until_finished(&job)?;
        self.collect(&job)
    }

    fn submit(&self, from_db: &str, to_db: &str, ids: &[String]) -> Result<String, IdMapError> {
        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .form(&[("from", from_db), ("to", to_db), ("ids", &ids.join(","))])
            .send()?;
        if !response.status().is_success() {
            return Err(IdMapError::Service(response.status()));
        }
        let submitted: SubmitResponse = response.json()?;
        Ok(submitted.job_id)
    }

    fn wait_until_finished(&self, job: &str) -> Result<(), IdMapError> {
        let started = Instant::now();
        let mut interval = self.first_interval;

        loop {
            let response = self
                .client
                .get(format!("{}/status/{}", self.base_url, job))
                .send()?;
            if !response.status().is_success() {
                return Err(IdMapError::Service(response.status()));
            }
            let status: StatusResponse = response.json()?;

            let finished = status.results.is_some()
                || status.job_status.as_deref() == Some("FINISHED");
            if finished {
                return Ok(());
            }
            if let Some("ERROR") = status.job_status.as_deref() {
                return Err(IdMapError::Malformed(format!("job {job} failed")));
            }

            if started.elapsed() + interval > self.max_wait {
                return Err(IdMapError::Timeout {
                    job: job.to_string(),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(interval);
            interval = next_interval(interval);
        }
    }

    /// Fetch the result pages, following the `Link: ...;
    /// rel="next"` cursor until the service says there are no
    /// more. Stopping after one page would silently truncate
    /// jobs of more than `size` ids.
    fn collect(&self, job: &str) -> Result<Vec<(String, String)>, IdMapError> {
        let mut url = format!("{}/results/{}?size=500", self.base_url, job);
        let mut mapped = Vec::new();

        loop {
            let response = self.client.get(&url).send()?;
            if !response.status().is_success() {
                return Err(IdMapError::Service(response.status()));
            }
            let next = next_page(response.headers());
            let results: ResultsResponse = response.json()?;
            for pair in results.results {
                mapped.push(flatten_pair(pair)?);
            }
            match next {
                Some(next_url) => url = next_url,
                None => return Ok(mapped),
            }
        }
    }
}

/// The URL of the next result page, if the `Link` header
/// advertises one.
fn next_page(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (url, rel) = part.split_once(';')?;
        if rel.trim() == "rel=\"next\"" {
            Some(
                url.trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    })
}

fn flatten_pair(pair: MappedPair) -> Result<(String, String), IdMapError> {
    let to = match &pair.to {
        Value::String(s) => s.clone(),
        Value::Object(entry) => entry
            .get("primaryAccession")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                IdMapError::Malformed(format!("entry for {} has no accession", pair.from))
            })?,
        other => {
            return Err(IdMapError::Malformed(format!(
                "unexpected `to` value: {other}"
            )))
        }
    };
    Ok((pair.from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Answer one connection per canned response, in order,
    /// then stop listening. Each response closes its
    /// connection so the client reconnects for the next
    /// request.
    fn spawn_stub(listener: TcpListener, responses: Vec<String>) {
        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = stream.write_all(response.as_bytes());
            }
        });
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn bound_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        (listener, base_url)
    }

    #[test]
    fn test_map_ids_happy_path_against_a_stub() {
        let (listener, base_url) = bound_listener();
        spawn_stub(
            listener,
            vec![
                http_response("200 OK", "", r#"{"jobId": "J1"}"#),
                http_response("200 OK", "", r#"{"jobStatus": "FINISHED"}"#),
                http_response(
                    "200 OK",
                    "",
                    r#"{"results": [{"from": "Q16787", "to": "LAMA3"}]}"#,
                ),
            ],
        );

        let client = IdMapClient::with_base_url(base_url);
        let mapped = client
            .map_ids(UNIPROT_ACCESSION_DB, GENE_NAME_DB, &["Q16787".to_string()])
            .unwrap();

        assert_eq!(mapped, vec![("Q16787".to_string(), "LAMA3".to_string())]);
    }

    #[test]
    fn test_map_ids_follows_the_pagination_cursor() {
        let (listener, base_url) = bound_listener();
        let next_url = format!("{}/results/J1?cursor=2", base_url);
        spawn_stub(
            listener,
            vec![
                http_response("200 OK", "", r#"{"jobId": "J1"}"#),
                http_response("200 OK", "", r#"{"jobStatus": "FINISHED"}"#),
                http_response(
                    "200 OK",
                    &format!("link: <{next_url}>; rel=\"next\"\r\n"),
                    r#"{"results": [{"from": "Q16787", "to": "LAMA3"}]}"#,
                ),
                http_response(
                    "200 OK",
                    "",
                    r#"{"results": [{"from": "P24043", "to": "LAMA2"}]}"#,
                ),
            ],
        );

        let client = IdMapClient::with_base_url(base_url);
        let mapped = client
            .map_ids(
                UNIPROT_ACCESSION_DB,
                GENE_NAME_DB,
                &["Q16787".to_string(), "P24043".to_string()],
            )
            .unwrap();

        assert_eq!(
            mapped,
            vec![
                ("Q16787".to_string(), "LAMA3".to_string()),
                ("P24043".to_string(), "LAMA2".to_string())
            ],
            "both pages of results collected"
        );
    }

    #[test]
    fn test_map_ids_times_out_on_a_job_that_never_finishes() {
        let (listener, base_url) = bound_listener();
        spawn_stub(
            listener,
            vec![
                http_response("200 OK", "", r#"{"jobId": "J1"}"#),
                http_response("200 OK", "", r#"{"jobStatus": "RUNNING"}"#),
            ],
        );

        // deadline shorter than the first poll interval, so the
        // client gives up after one status check without sleeping.
        let client =
            IdMapClient::with_base_url(base_url).max_wait(Duration::from_millis(50));
        let result = client.map_ids(UNIPROT_ACCESSION_DB, GENE_NAME_DB, &["Q16787".to_string()]);

        assert!(
            matches!(result, Err(IdMapError::Timeout { ref job, .. }) if job == "J1"),
            "expected a timeout, got {result:?}"
        );
    }

    #[test]
    fn test_map_ids_surfaces_a_service_error() {
        let (listener, base_url) = bound_listener();
        spawn_stub(
            listener,
            vec![http_response("500 Internal Server Error", "", "")],
        );

        let client = IdMapClient::with_base_url(base_url);
        let result = client.map_ids(UNIPROT_ACCESSION_DB, GENE_NAME_DB, &["Q16787".to_string()]);

        assert!(matches!(
            result,
            Err(IdMapError::Service(StatusCode::INTERNAL_SERVER_ERROR))
        ));
    }

    #[test]
    fn test_map_ids_surfaces_a_failed_job() {
        let (listener, base_url) = bound_listener();
        spawn_stub(
            listener,
            vec![
                http_response("200 OK", "", r#"{"jobId": "J1"}"#),
                http_response("200 OK", "", r#"{"jobStatus": "ERROR"}"#),
            ],
        );

        let client = IdMapClient::with_base_url(base_url);
        let result = client.map_ids(UNIPROT_ACCESSION_DB, GENE_NAME_DB, &["Q16787".to_string()]);

        assert!(matches!(result, Err(IdMapError::Malformed(_))));
    }

    #[test]
    fn test_next_page_reads_the_link_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            "<https://rest.uniprot.org/idmapping/results/J1?cursor=abc&size=500>; rel=\"next\""
                .parse()
                .unwrap(),
        );

        assert_eq!(
            next_page(&headers).as_deref(),
            Some("https://rest.uniprot.org/idmapping/results/J1?cursor=abc&size=500")
        );
        assert_eq!(next_page(&reqwest::header::HeaderMap::new()), None);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut interval = Duration::from_millis(250);
        let mut schedule = Vec::new();
        for _ in 0..6 {
            schedule.push(interval);
            interval = next_interval(interval);
        }

        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_results_pairs_flatten_plain_and_entry_targets() {
        let body = r#"{
            "results": [
                {"from": "Q16787", "to": "LAMA3"},
                {"from": "P24043", "to": {"primaryAccession": "P24043-2"}}
            ]
        }"#;
        let parsed: ResultsResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].from, "Q16787");
        assert_eq!(parsed.results[0].to, Value::String("LAMA3".to_string()));
    }
}
