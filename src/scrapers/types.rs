use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog search endpoint, relative to the marketplace root
pub const API_PATH: &str = "/api/v2/catalog/items";

/// Problems turning user input into a fetchable search
#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("missing required parameter: search_text")]
    MissingSearchText,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to parse {key}: {value:?} is not a valid number")]
    InvalidNumber { key: String, value: String },
}

/// Search parameters for the catalog API
///
/// Fields are private: a value is built once (from a catalog URL or the
/// builder methods) and then only read. The JSON form is what gets stored
/// alongside a saved search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchParams {
    /// Free-text query, mandatory
    search_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    catalog_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    size_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    brand_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    status_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patterns_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price_from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

/// Programmatic construction, used by tests; saved searches come from catalog URLs.
#[cfg(test)]
impl SearchParams {
    /// Start a search for `search_text`. Fails when the text is blank.
    pub fn new(search_text: impl Into<String>) -> Result<Self, ParamsError> {
        let search_text = search_text.into().trim().to_string();
        if search_text.is_empty() {
            return Err(ParamsError::MissingSearchText);
        }
        Ok(Self {
            search_text,
            ..Self::default()
        })
    }

    pub fn catalog_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.catalog_ids = ids.into_iter().collect();
        self
    }

    pub fn size_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.size_ids = ids.into_iter().collect();
        self
    }

    pub fn brand_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.brand_ids = ids.into_iter().collect();
        self
    }

    pub fn status_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.status_ids = ids.into_iter().collect();
        self
    }

    pub fn patterns_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.patterns_ids = ids.into_iter().collect();
        self
    }

    pub fn price_range(mut self, from: Option<f64>, to: Option<f64>) -> Self {
        self.price_from = from;
        self.price_to = to;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

impl SearchParams {
    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    /// Parse a catalog URL as copied from the marketplace website.
    ///
    /// Query keys are matched case-insensitively and both `catalog[]` (web)
    /// and `catalog_ids[]` (API) are accepted. Unknown keys such as `time`
    /// or `order` are ignored.
    pub fn from_catalog_url(raw: &str) -> Result<Self, ParamsError> {
        let url = Url::parse(raw).map_err(|e| ParamsError::InvalidUrl(e.to_string()))?;
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            let key = key.to_ascii_lowercase();
            match key.as_str() {
                "search_text" => params.search_text = value.trim().to_string(),
                "catalog[]" | "catalog_ids[]" => params.catalog_ids.push(parse_number(&key, &value)?),
                "size_ids[]" => params.size_ids.push(parse_number(&key, &value)?),
                "brand_ids[]" => params.brand_ids.push(parse_number(&key, &value)?),
                "status_ids[]" => params.status_ids.push(parse_number(&key, &value)?),
                "patterns_ids[]" => params.patterns_ids.push(parse_number(&key, &value)?),
                "price_from" => params.price_from = Some(parse_number(&key, &value)?),
                "price_to" => params.price_to = Some(parse_number(&key, &value)?),
                "page" => params.page = Some(parse_number(&key, &value)?),
                "currency" if !value.is_empty() => params.currency = Some(value.into_owned()),
                _ => {}
            }
        }

        if params.search_text.is_empty() {
            return Err(ParamsError::MissingSearchText);
        }
        Ok(params)
    }

    /// Build the catalog API URL rooted at `base`.
    ///
    /// Keys are emitted in sorted order. Spaces in the free text come out as
    /// a literal `+` and a `+` is never left as `%2B`: the remote returns
    /// different (usually fewer) results for the percent-encoded form.
    pub fn to_api_url(&self, base: &Url) -> Result<String, ParamsError> {
        let search_text = self.search_text.trim();
        if search_text.is_empty() {
            return Err(ParamsError::MissingSearchText);
        }

        let mut pairs: Vec<(&str, String)> = vec![
            ("search_text", search_text.to_string()),
            ("order", "newest_first".to_string()),
        ];
        if let Some(currency) = self.currency.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("currency", currency.to_string()));
        }
        if let Some(page) = self.page.filter(|p| *p > 0) {
            pairs.push(("page", page.to_string()));
        }
        if let Some(from) = self.price_from.filter(|p| *p > 0.0) {
            pairs.push(("price_from", format!("{from:.2}")));
        }
        if let Some(to) = self.price_to.filter(|p| *p > 0.0) {
            pairs.push(("price_to", format!("{to:.2}")));
        }
        for (key, ids) in [
            ("catalog_ids[]", &self.catalog_ids),
            ("size_ids[]", &self.size_ids),
            ("brand_ids[]", &self.brand_ids),
            ("status_ids[]", &self.status_ids),
            ("patterns_ids[]", &self.patterns_ids),
        ] {
            pairs.extend(ids.iter().map(|id| (key, id.to_string())));
        }
        // stable: repeated keys keep their insertion order
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut url = base
            .join(API_PATH)
            .map_err(|e| ParamsError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));

        Ok(url.as_str().replace("%2B", "+"))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ParamsError> {
    value.trim().parse().map_err(|_| ParamsError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}
