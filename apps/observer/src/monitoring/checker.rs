use std::time::Duration;

use reqwest::Request;
use thiserror::Error;

/// The HTTP client could not be set up.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
}

/// One network round trip for a prepared request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response status code. An error means
    /// no response came back at all.
    async fn execute(&self, request: Request) -> anyhow::Result<u16>;
}

/// HTTP/HTTPS transport backed by a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport. Without a timeout a request may wait indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!("uppe-observer/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self { client: builder.build()? })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> anyhow::Result<u16> {
        let response = self.client.execute(request).await?;

        // Any answer means the endpoint is reachable, whatever the code says.
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    async fn serve_once(status_line: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        });

        Url::parse(&format!("http://{addr}/health")).unwrap()
    }

    #[tokio::test]
    async fn test_http_transport_reports_status_code() {
        let url = serve_once("503 Service Unavailable").await;
        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();

        let status = transport.execute(Request::new(Method::GET, url)).await.unwrap();
        assert_eq!(status, 503);
    }

    #[tokio::test]
    async fn test_http_transport_fails_on_refused_connection() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();

        let error = transport.execute(Request::new(Method::HEAD, url)).await.unwrap_err();
        let error = error.downcast_ref::<reqwest::Error>().expect("transport errors come from reqwest");
        assert!(error.is_connect());
    }
}
