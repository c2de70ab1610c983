//! Request models
//!
//! The intercepted request as seen by the classifier, the strategies and the replay queue.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

// == Request Mode ==
/// How the request was issued, mirroring `Sec-Fetch-Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    Cors,
    NoCors,
    SameOrigin,
    Unknown,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Self::Navigate,
            "cors" => Self::Cors,
            "no-cors" => Self::NoCors,
            "same-origin" => Self::SameOrigin,
            _ => Self::Unknown,
        }
    }
}

// == Destination ==
/// What the response will be used for, mirroring `Sec-Fetch-Dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Document,
    Style,
    Script,
    Worker,
    Image,
    Font,
    Empty,
    Other,
}

impl Destination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "worker" | "sharedworker" | "serviceworker" => Self::Worker,
            "image" => Self::Image,
            "font" => Self::Font,
            "empty" => Self::Empty,
            _ => Self::Other,
        }
    }

    /// Guesses the destination from the path's file extension.
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or_default();
        let ext = match file.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Self::Empty,
        };

        match ext.as_str() {
            "css" => Self::Style,
            "js" | "mjs" => Self::Script,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" | "bmp" => {
                Self::Image
            }
            "woff" | "woff2" | "ttf" | "otf" => Self::Font,
            "html" | "htm" => Self::Document,
            _ => Self::Other,
        }
    }
}

// == Proxy Request ==
/// One intercepted request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    /// Header pairs in arrival order, names lowercased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl ProxyRequest {
    // == Constructors ==
    /// Creates a bodiless request with mode and destination inferred from the URL.
    pub fn new(method: Method, url: Url) -> Self {
        Self::from_parts(method, url, Vec::new(), Vec::new())
    }

    /// Builds a request from raw parts, inferring mode and destination.
    ///
    /// `Sec-Fetch-Mode` and `Sec-Fetch-Dest` win when present. Without them the
    /// destination comes from the path extension, and a GET accepting `text/html`
    /// is treated as a navigation.
    pub fn from_parts(
        method: Method,
        url: Url,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        let find = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        };

        let destination = find("sec-fetch-dest")
            .map(Destination::from_header)
            .unwrap_or_else(|| Destination::from_path(url.path()));

        let mode = match find("sec-fetch-mode") {
            Some(value) => RequestMode::from_header(value),
            None => {
                let accepts_html = find("accept").is_some_and(|a| a.contains("text/html"));
                if method == Method::GET && accepts_html {
                    RequestMode::Navigate
                } else {
                    RequestMode::Unknown
                }
            }
        };

        Self {
            method,
            url,
            headers,
            body,
            mode,
            destination,
        }
    }

    // == Builders ==
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    // == Accessors ==
    /// Returns the first value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Full-document load.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }

    /// GET or HEAD.
    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// POST, PUT, DELETE or PATCH.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH
        )
    }

    // == Request Key ==
    /// URL with the fragment dropped and query pairs sorted.
    pub fn normalized_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }

        url.to_string()
    }

    /// Derives the cache key from method, normalized URL and the selected headers.
    ///
    /// Header names in `key_headers` are matched case-insensitively; a missing
    /// header contributes an empty value so presence and absence key differently
    /// from any non-empty value.
    pub fn request_key(&self, key_headers: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.normalized_url().as_bytes());

        for name in key_headers {
            hasher.update(b"\n");
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(self.header(name).unwrap_or_default().as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}
