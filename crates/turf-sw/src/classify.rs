//! Request classification.

use turf_net::{Request, RequestDestination};

/// Which caching strategy serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Page documents: network first, cache as backup.
    Document,
    /// Everything else: cache first, populate on miss.
    Asset,
}

impl RequestClass {
    pub fn strategy(&self) -> &'static str {
        match self {
            RequestClass::Document => "network-first",
            RequestClass::Asset => "cache-first",
        }
    }
}

/// Classify a request.
///
/// A request is a document if it navigates a top-level document or its URL
/// path ends in one of `document_suffixes` (case-sensitive).
pub fn classify(request: &Request, document_suffixes: &[String]) -> RequestClass {
    if request.destination == RequestDestination::Document {
        return RequestClass::Document;
    }

    let path = request.url.path();
    if document_suffixes.iter().any(|suffix| path.ends_with(suffix.as_str())) {
        RequestClass::Document
    } else {
        RequestClass::Asset
    }
}
