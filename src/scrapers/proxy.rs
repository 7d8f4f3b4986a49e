use reqwest::{Proxy, Url};
use tracing::warn;

/// Environment variable holding extra comma-separated proxy URLs
pub const PROXIES_ENV_VAR: &str = "PROXY_URLS";

/// Fixed, ordered set of egress proxies handed out round-robin
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    endpoints: Vec<Url>,
    cursor: usize,
}

impl ProxyPool {
    /// Build a pool from raw URLs, skipping (and logging) any that don't parse.
    pub fn from_urls<S: AsRef<str>>(raw: &[S]) -> Self {
        let endpoints = raw
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| match Url::parse(s) {
                Ok(url) => match Proxy::all(url.clone()) {
                    Ok(_) => Some(url),
                    Err(e) => {
                        warn!(proxy_url = %s, error = %e, "Unsupported proxy URL, skipping");
                        None
                    }
                },
                Err(e) => {
                    warn!(proxy_url = %s, error = %e, "Invalid proxy URL, skipping");
                    None
                }
            })
            .collect();

        Self {
            endpoints,
            cursor: 0,
        }
    }

    /// Merge configured proxies with the ones listed in `PROXY_URLS`.
    pub fn from_config_and_env(configured: &[String]) -> Self {
        let mut raw = configured.to_vec();
        if let Ok(value) = std::env::var(PROXIES_ENV_VAR) {
            raw.extend(value.split(',').map(str::to_string));
        }
        Self::from_urls(&raw)
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Index of the proxy to use for the next request, or `None` to go direct.
    pub fn next_index(&mut self) -> Option<usize> {
        if self.endpoints.is_empty() {
            return None;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_goes_direct() {
        let mut pool = ProxyPool::from_urls::<&str>(&[]);
        assert!(pool.is_empty());
        assert_eq!(pool.next_index(), None);
        assert_eq!(pool.next_index(), None);
    }

    #[test]
    fn rotates_round_robin() {
        let mut pool = ProxyPool::from_urls(&[
            "http://10.0.0.1:8080",
            "http://10.0.0.2:8080",
            "http://10.0.0.3:8080",
        ]);
        let order: Vec<_> = (0..7).filter_map(|_| pool.next_index()).collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let pool = ProxyPool::from_urls(&["not a url", "", "http://user:pw@proxy.local:3128"]);
        assert_eq!(pool.endpoints().len(), 1);
        assert_eq!(pool.endpoints()[0].host_str(), Some("proxy.local"));
    }

    #[test]
    fn unsupported_schemes_are_skipped() {
        let pool = ProxyPool::from_urls(&["socks5://127.0.0.1:1080", "http://10.0.0.1:8080"]);
        assert_eq!(pool.endpoints().len(), 1);
        assert_eq!(pool.endpoints()[0].scheme(), "http");
    }
}
