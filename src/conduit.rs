//! Conduit: generic query/fetch plumbing.
//!
//! A [`Conduit`] pairs a [`DownloadHandler`] (turns a URL into a body) with a
//! [`HandlerRegistry`] (turns a body into a typed value). The pipeline receives its conduit as
//! an explicit value, so tests and embedders swap the downloader without touching any shared
//! state.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use reqwest::Url;

use crate::error::FetchError;

// ═══════════════════════════════════════════════════════════════════════════════
// DOWNLOADING
// ═══════════════════════════════════════════════════════════════════════════════

/// Fetches the body behind a URL.
pub trait DownloadHandler {
    fn download(&self, url: &Url) -> Result<String, FetchError>;
}

/// Default handler: blocking HTTP GET that requires a success status.
pub struct HttpDownloader {
    client: Result<reqwest::blocking::Client, String>,
}

impl HttpDownloader {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("phraser/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| e.to_string());
        Self { client }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadHandler for HttpDownloader {
    fn download(&self, url: &Url) -> Result<String, FetchError> {
        let transport = |message: String| FetchError::Transport {
            url: url.to_string(),
            message,
        };

        let client = self.client.as_ref().map_err(|e| transport(e.clone()))?;
        let response = client
            .get(url.clone())
            .send()
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| transport(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Interprets a downloaded body as a value of type `T`.
pub trait ResponseHandler<T> {
    fn handle(&self, response: &str) -> Result<T, FetchError>;
}

/// Parses bodies as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl ResponseHandler<serde_json::Value> for JsonHandler {
    fn handle(&self, response: &str) -> Result<serde_json::Value, FetchError> {
        serde_json::from_str(response).map_err(|e| FetchError::Handler(e.to_string()))
    }
}

/// Response handlers keyed by the type they produce.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, Box<dyn Any>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the JSON handler installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<serde_json::Value, _>(JsonHandler);
        registry
    }

    /// Install `handler` for `T`, replacing any previous one.
    pub fn register<T: 'static, H: ResponseHandler<T> + 'static>(&mut self, handler: H) {
        let boxed: Box<dyn ResponseHandler<T>> = Box::new(handler);
        self.handlers.insert(TypeId::of::<T>(), Box::new(boxed));
    }

    pub fn get<T: 'static>(&self) -> Option<&dyn ResponseHandler<T>> {
        self.handlers
            .get(&TypeId::of::<T>())
            .and_then(|handler| handler.downcast_ref::<Box<dyn ResponseHandler<T>>>())
            .map(|handler| handler.as_ref())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<T>())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONDUIT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Conduit {
    downloader: Box<dyn DownloadHandler>,
    registry: HandlerRegistry,
}

impl Default for Conduit {
    fn default() -> Self {
        Self::new()
    }
}

impl Conduit {
    /// HTTP downloader plus the default handlers.
    pub fn new() -> Self {
        Self::with_downloader(HttpDownloader::new())
    }

    pub fn with_downloader(downloader: impl DownloadHandler + 'static) -> Self {
        Self {
            downloader: Box::new(downloader),
            registry: HandlerRegistry::with_defaults(),
        }
    }

    pub fn set_downloader(&mut self, downloader: impl DownloadHandler + 'static) {
        self.downloader = Box::new(downloader);
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Download `path` with `params` appended as a query string.
    pub fn query(&self, path: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let full = build_query(path, params);
        let url = Url::parse(&full).map_err(|e| FetchError::Malformed {
            reference: full.clone(),
            message: e.to_string(),
        })?;
        self.query_url(&url)
    }

    pub fn query_url(&self, url: &Url) -> Result<String, FetchError> {
        self.downloader.download(url)
    }

    /// Download and interpret the body with the handler registered for `T`.
    pub fn query_as<T: 'static>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, FetchError> {
        let handler = self
            .registry
            .get::<T>()
            .ok_or(FetchError::NoHandler(type_name::<T>()))?;
        let body = self.query(path, params)?;
        handler.handle(&body)
    }
}

fn build_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}
