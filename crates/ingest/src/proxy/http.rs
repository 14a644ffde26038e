use std::time::Duration;

use async_trait::async_trait;
use exn::ResultExt;
use modfetch_config::ProxyConfig;
use reqwest::{Client, Response, StatusCode};
use tracing::instrument;

use super::{ProxyClient, VersionInfo, escape};
use crate::error::{ErrorKind, Result};

/// Client for a proxy speaking the GOPROXY protocol over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: Client,
    base_url: String,
    max_archive_size: u64,
}

impl HttpProxy {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_archive_size: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("modfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Internal("could not build HTTP client".to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, max_archive_size })
    }

    pub fn from_config(config: &ProxyConfig, max_archive_size: u64) -> Result<Self> {
        Self::new(&config.url, config.timeout(), max_archive_size)
    }

    fn url(&self, module_path: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.base_url, escape(module_path), suffix)
    }

    async fn get(&self, url: &str, what: &str) -> Result<Response> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Proxy(format!("requesting {url}")))?;
        match status_error(response.status(), what) {
            None => Ok(response),
            Some(kind) => exn::bail!(kind),
        }
    }

    async fn get_info(&self, url: &str, what: &str) -> Result<VersionInfo> {
        let body = self
            .get(url, what)
            .await?
            .bytes()
            .await
            .or_raise(|| ErrorKind::Proxy(format!("reading {url}")))?;
        VersionInfo::from_json(&body)
    }
}

/// The error a proxy response status stands for, if any. Only 404 and 410
/// are definitive answers about the module version.
fn status_error(status: StatusCode, what: &str) -> Option<ErrorKind> {
    match status {
        status if status.is_success() => None,
        StatusCode::NOT_FOUND => Some(ErrorKind::NotFound(what.to_string())),
        StatusCode::GONE => Some(ErrorKind::Gone(what.to_string())),
        status => Some(ErrorKind::Proxy(format!("{what}: proxy returned {status}"))),
    }
}

#[async_trait]
impl ProxyClient for HttpProxy {
    #[instrument(skip(self))]
    async fn info(&self, module_path: &str, version: &str) -> Result<VersionInfo> {
        let url = self.url(module_path, &format!("@v/{}.info", escape(version)));
        self.get_info(&url, &format!("{module_path}@{version}")).await
    }

    #[instrument(skip(self))]
    async fn latest(&self, module_path: &str) -> Result<VersionInfo> {
        let url = self.url(module_path, "@latest");
        self.get_info(&url, module_path).await
    }

    #[instrument(skip(self))]
    async fn archive(&self, module_path: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.url(module_path, &format!("@v/{}.zip", escape(version)));
        let mut response = self.get(&url, &format!("{module_path}@{version}")).await?;
        let too_large = || ErrorKind::too_large(format!("archive exceeds {} bytes", self.max_archive_size));
        if response.content_length().is_some_and(|len| len > self.max_archive_size) {
            exn::bail!(too_large());
        }
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await.or_raise(|| ErrorKind::Proxy(format!("reading {url}")))? {
            if (data.len() + chunk.len()) as u64 > self.max_archive_size {
                exn::bail!(too_large());
            }
            data.extend_from_slice(&chunk);
        }
        tracing::debug!(bytes = data.len(), "downloaded archive");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const MODULE: &str = "github.com/my/module";

    /// Answers every request with `status` and `body`. Without a content
    /// length the body ends when the connection closes.
    async fn serve(status: &'static str, body: Vec<u8>, content_length: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0; 1024];
                    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let mut head = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
                    if content_length {
                        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
                    }
                    head.push_str("\r\n");
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn urls_are_escaped() {
        let proxy = HttpProxy::new("https://proxy.example/", Duration::from_secs(1), 1).unwrap();
        assert_eq!(
            proxy.url("github.com/BurntSushi/toml", "@v/v1.0.0.info"),
            "https://proxy.example/github.com/!burnt!sushi/toml/@v/v1.0.0.info"
        );
    }

    #[rstest]
    #[case(StatusCode::OK, None)]
    #[case(StatusCode::NOT_FOUND, Some(ErrorKind::NotFound(MODULE.to_string())))]
    #[case(StatusCode::GONE, Some(ErrorKind::Gone(MODULE.to_string())))]
    #[case(
        StatusCode::INTERNAL_SERVER_ERROR,
        Some(ErrorKind::Proxy(format!("{MODULE}: proxy returned 500 Internal Server Error")))
    )]
    #[case(
        StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorKind::Proxy(format!("{MODULE}: proxy returned 503 Service Unavailable")))
    )]
    fn response_statuses(#[case] status: StatusCode, #[case] expected: Option<ErrorKind>) {
        assert_eq!(status_error(status, MODULE), expected);
    }

    #[tokio::test]
    async fn info_over_http() {
        let body = br#"{"Version":"v1.0.0","Time":"2019-11-09T02:19:31Z"}"#.to_vec();
        let proxy = HttpProxy::new(serve("200 OK", body, true).await, Duration::from_secs(5), 1024).unwrap();
        let info = proxy.info(MODULE, "v1.0.0").await.unwrap();
        assert_eq!(info.version, "v1.0.0");
        assert_eq!(info.time.unix_timestamp(), 1_573_265_971);
    }

    #[rstest]
    #[case::not_found("404 Not Found", StatusCode::NOT_FOUND)]
    #[case::gone("410 Gone", StatusCode::GONE)]
    #[case::unavailable("503 Service Unavailable", StatusCode::SERVICE_UNAVAILABLE)]
    #[tokio::test]
    async fn error_statuses_over_http(#[case] line: &'static str, #[case] status: StatusCode) {
        let proxy = HttpProxy::new(serve(line, Vec::new(), true).await, Duration::from_secs(5), 1024).unwrap();
        let err = proxy.archive(MODULE, "v1.0.0").await.unwrap_err();
        let what = format!("{MODULE}@v1.0.0");
        assert_eq!(Some((*err).clone()), status_error(status, &what));
    }

    #[rstest]
    #[case::declared_length(true)]
    #[case::streamed(false)]
    #[tokio::test]
    async fn archive_size_is_capped(#[case] content_length: bool) {
        let url = serve("200 OK", vec![7; 64], content_length).await;

        let small = HttpProxy::new(&url, Duration::from_secs(5), 16).unwrap();
        let err = small.archive(MODULE, "v1.0.0").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TooLarge(_)), "{err:?}");

        let exact = HttpProxy::new(&url, Duration::from_secs(5), 64).unwrap();
        assert_eq!(exact.archive(MODULE, "v1.0.0").await.unwrap(), vec![7; 64]);
    }
}
