use crate::models::{Listing, Price};
use crate::scrapers::error::FetchError;
use crate::scrapers::proxy::ProxyPool;
use crate::scrapers::traits::ListingSource;
use crate::scrapers::types::SearchParams;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER, USER_AGENT,
};
use reqwest::{Client, Proxy, Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Vinted catalog client
///
/// Owns one cookie session shared by every search and rotates through the
/// configured proxies, one per outbound request.
pub struct VintedClient {
    base_url: Url,
    proxies: ProxyPool,
    session: Session,
}

/// HTTP clients sharing one cookie jar: a direct one plus one per proxy.
struct Session {
    direct: Client,
    proxied: Vec<Client>,
}

impl Session {
    fn open(proxies: &[Url]) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());
        let direct = build_client(&jar, None)?;
        let proxied = proxies
            .iter()
            .map(|proxy| build_client(&jar, Some(proxy)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { direct, proxied })
    }
}

fn build_client(jar: &Arc<Jar>, proxy: Option<&Url>) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .cookie_provider(Arc::clone(jar))
        .default_headers(browser_headers())
        .timeout(REQUEST_TIMEOUT);

    let builder = match proxy {
        Some(url) => builder.proxy(Proxy::all(url.clone())?),
        None => builder.no_proxy(),
    };
    builder.build()
}

/// The remote rejects requests that don't look like they come from a browser.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

impl VintedClient {
    /// Create a client without touching the network
    pub fn new(base_url: Url, proxies: ProxyPool) -> Result<Self, FetchError> {
        let session = Session::open(proxies.endpoints()).map_err(FetchError::Network)?;
        Ok(Self {
            base_url,
            proxies,
            session,
        })
    }

    /// Create a client and bootstrap its session
    ///
    /// A failed bootstrap is logged and otherwise ignored; later fetches
    /// will surface the problem.
    pub async fn connect(base_url: Url, proxies: ProxyPool) -> Result<Self, FetchError> {
        let mut client = Self::new(base_url, proxies)?;

        if client.proxies.is_empty() {
            info!("No proxies configured");
        } else {
            info!(count = client.proxies.endpoints().len(), "Using proxies");
        }

        if let Err(e) = client.reset_session().await {
            error!(error = %e, "Error initializing Vinted session, continuing anyway");
        }
        Ok(client)
    }

    /// Discard cookies and request the site root to obtain a fresh session.
    pub async fn reset_session(&mut self) -> Result<(), FetchError> {
        self.session = Session::open(self.proxies.endpoints()).map_err(FetchError::Network)?;

        let root = self.base_url.to_string();
        let response = self.send(&root).await?;
        info!(status = %response.status(), "Session reset");
        Ok(())
    }

    async fn send(&mut self, url: &str) -> Result<Response, FetchError> {
        let client = match self.proxies.next_index() {
            Some(index) => {
                debug!(
                    proxy = self.proxies.endpoints()[index].host_str().unwrap_or("?"),
                    "Using proxy"
                );
                &self.session.proxied[index]
            }
            None => &self.session.direct,
        };

        client.get(url).send().await.map_err(FetchError::Network)
    }
}

#[async_trait]
impl ListingSource for VintedClient {
    async fn fetch(&mut self, params: &SearchParams) -> Result<Vec<Listing>, FetchError> {
        let url = params.to_api_url(&self.base_url)?;
        info!(vinted_api_url = %url, "Making Vinted API request");

        let mut response = self.send(&url).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Got 401, re-initializing Vinted session");
            self.reset_session()
                .await
                .map_err(|e| FetchError::Auth(format!("session bootstrap failed: {e}")))?;

            response = self.send(&url).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(FetchError::Auth(format!(
                    "API still returned {}",
                    response.status()
                )));
            }
        }

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Vinted API returned an error status");
            return Err(FetchError::RemoteStatus(status));
        }

        let body = response.bytes().await.map_err(FetchError::Network)?;
        let decoded: ItemsResponse = serde_json::from_slice(&body).map_err(FetchError::Decode)?;

        debug!(count = decoded.items.len(), "Decoded Vinted items");
        Ok(decoded.items.into_iter().map(Listing::from).collect())
    }

    fn source_name(&self) -> &'static str {
        "Vinted"
    }
}

// Wire format of the catalog endpoint. Only the fields we use are declared.

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    price: Option<RawPrice>,
    #[serde(default)]
    size_title: Option<String>,
    #[serde(default)]
    brand_title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    photo: Option<RawPhoto>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    #[serde(default)]
    amount: Option<RawAmount>,
    #[serde(default)]
    currency_code: Option<String>,
}

/// Amounts normally arrive as strings ("12.0") but tolerate bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    high_resolution: Option<RawResolution>,
}

#[derive(Debug, Deserialize)]
struct RawResolution {
    #[serde(default)]
    timestamp: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<RawItem> for Listing {
    fn from(item: RawItem) -> Self {
        let price = item
            .price
            .map(|p| Price {
                amount: match p.amount {
                    Some(RawAmount::Text(s)) => s,
                    Some(RawAmount::Number(n)) => n.to_string(),
                    None => String::new(),
                },
                currency_code: p.currency_code.unwrap_or_default(),
            })
            .unwrap_or(Price {
                amount: String::new(),
                currency_code: String::new(),
            });

        let (photo_url, timestamp) = match item.photo {
            Some(photo) => (
                non_empty(photo.url),
                photo.high_resolution.and_then(|r| r.timestamp),
            ),
            None => (None, None),
        };

        // no timestamp: treat as ancient so it never passes a lookback filter
        let uploaded_at = timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_default();

        Listing {
            id: item.id,
            title: item.title.unwrap_or_default(),
            price,
            size_title: non_empty(item.size_title),
            brand_title: non_empty(item.brand_title),
            url: item.url.unwrap_or_default(),
            photo_url,
            uploaded_at,
        }
    }
}
