use std::{future::Future, sync::Arc};

use bytes::Bytes;
use reqwest::{header::HeaderMap, Client, ClientBuilder};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{PlayError, PlayResult};

/// Outcome of a single completed request. Non-success statuses are data, not errors.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub success: bool,
    pub status: u16,
    pub body: Bytes,
    pub headers: HeaderMap,
    /// URI after redirects.
    pub final_uri: Url,
}

impl DownloadResponse {
    pub fn ok(uri: Url, body: impl Into<Bytes>) -> Self {
        Self {
            success: true,
            status: 200,
            body: body.into(),
            headers: HeaderMap::new(),
            final_uri: uri,
        }
    }

    pub fn with_status(uri: Url, status: u16) -> Self {
        Self {
            success: (200..300).contains(&status),
            status,
            body: Bytes::new(),
            headers: HeaderMap::new(),
            final_uri: uri,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport used for every manifest and segment request.
///
/// Implementations perform a single attempt per call and must return
/// [`PlayError::Interrupted`] promptly once `cancel` fires.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        uri: &Url,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PlayResult<DownloadResponse>> + Send;
}

impl<D> Downloader for Arc<D>
where
    D: Downloader,
{
    fn download(
        &self,
        uri: &Url,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PlayResult<DownloadResponse>> + Send {
        self.as_ref().download(uri, cancel)
    }
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpDownloader {
    pub fn new(builder: ClientBuilder) -> PlayResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    /// Seed the cookie jar with `Set-Cookie` style strings scoped to `url`.
    pub fn add_cookies(&self, cookies: Vec<String>, url: &Url) {
        let Ok(mut lock) = self.cookies_store.lock() else {
            return;
        };
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, url) {
                tracing::warn!(%cookie, "Ignoring invalid cookie: {e}");
            }
        }
    }

    async fn fetch(&self, uri: &Url) -> PlayResult<DownloadResponse> {
        let response = self.client.get(uri.clone()).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let final_uri = response.url().clone();
        let body = response.bytes().await?;

        Ok(DownloadResponse {
            success: status.is_success(),
            status: status.as_u16(),
            body,
            headers,
            final_uri,
        })
    }
}

impl Downloader for HttpDownloader {
    async fn download(
        &self,
        uri: &Url,
        cancel: &CancellationToken,
    ) -> PlayResult<DownloadResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlayError::Interrupted),
            response = self.fetch(uri) => response,
        }
    }
}
