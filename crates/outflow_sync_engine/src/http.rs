//! HTTP transport implementation.
//!
//! Posts each batch as JSON to `<api_base><endpoint>` with `reqwest`. The
//! request is raced against the synchronizer's cancellation token, so
//! `stop()` aborts it mid-flight.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{MutationTransport, TransportResponse};
use async_trait::async_trait;
use outflow_protocol::MutationBatch;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP-based mutation transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport posting to the endpoint described by `config`.
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a transport using an existing client.
    pub fn with_client(client: reqwest::Client, config: &SyncConfig) -> Self {
        Self {
            client,
            url: config.mutations_url(),
            timeout: config.request_timeout,
        }
    }

    /// Returns the URL batches are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: Vec<u8>) -> SyncResult<TransportResponse> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout
            } else {
                SyncError::transport_retryable(e.to_string())
            }
        })?;

        Ok(TransportResponse::new(response.status().as_u16()))
    }
}

#[async_trait]
impl MutationTransport for HttpTransport {
    async fn send(
        &self,
        batch: &MutationBatch,
        cancel: &CancellationToken,
    ) -> SyncResult<TransportResponse> {
        let body = batch.to_json()?;

        tokio::select! {
            result = self.post(body) => result,
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outflow_protocol::{ChangeRecord, Operation};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accepts one connection, captures the raw request and answers with
    /// `status`. With `status == None` it never answers.
    async fn one_shot_server(status: Option<u16>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);

            match status {
                Some(status) => {
                    let response = format!(
                        "HTTP/1.1 {status} Status\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        });

        (format!("http://{addr}"), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn batch() -> MutationBatch {
        let value = json!({"pub_key": "k1", "name": "alice"});
        let changes = vec![ChangeRecord::new(
            1,
            Operation::Insert,
            value.as_object().cloned().unwrap(),
            "w1",
            "t1",
        )];
        MutationBatch::from_changes(&changes, "users")
    }

    #[tokio::test]
    async fn posts_json_to_ingest_endpoint() {
        let (base, request) = one_shot_server(Some(200)).await;
        let transport = HttpTransport::new(&SyncConfig::new(base));

        let response = transport
            .send(&batch(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /ingest/mutations HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));

        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["mutations"][0]["type"], "insert");
        assert_eq!(body["mutations"][0]["syncMetadata"]["relation"], "users");
    }

    #[tokio::test]
    async fn reports_rejection_status() {
        let (base, _request) = one_shot_server(Some(422)).await;
        let transport = HttpTransport::new(&SyncConfig::new(base));

        let response = transport
            .send(&batch(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 422);
    }

    #[tokio::test]
    async fn connection_refused_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&SyncConfig::new(format!("http://{addr}")));
        let err = transport
            .send(&batch(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancel_aborts_pending_request() {
        let (base, request) = one_shot_server(None).await;
        let transport = HttpTransport::new(&SyncConfig::new(base));
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            let _ = request.await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), transport.send(&batch(), &token))
            .await
            .expect("send should resolve once cancelled");
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn request_timeout_maps_to_timeout() {
        let (base, _request) = one_shot_server(None).await;
        let config = SyncConfig::new(base).with_request_timeout(Duration::from_millis(100));
        let transport = HttpTransport::new(&config);

        let result = transport.send(&batch(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::Timeout)));
    }
}
