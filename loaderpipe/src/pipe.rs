//! Pipes: the transport an adapter dispatches to
//!
//! A `PipeHandler` talks bytes to some backend. A `Pipe<T>` wraps a handler
//! with the codecs for `T` and is what operation units call from worker
//! threads. Calls block; the task manager keeps them off the consumer thread.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{JsonRequestBuilder, JsonResponseParser, RequestBuilder, ResponseParser};
use crate::error::Outcome;
use crate::filter::ReadFilter;

/// Kind of backend a pipe talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeType {
    Rest,
    Local,
    Custom(String),
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::Local => write!(f, "local"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Byte-level backend operations
///
/// Implementations own their retry and timeout policy; every call is made
/// exactly once per operation.
pub trait PipeHandler: Send + Sync {
    /// Fetch the items matching `filter` (all items if `None`) as one body
    fn on_read(&self, filter: Option<&ReadFilter>) -> Outcome<Vec<u8>>;

    /// Store an encoded item and return the stored representation
    fn on_save(&self, body: &[u8]) -> Outcome<Vec<u8>>;

    /// Delete the item with the given id
    fn on_remove(&self, id: &str) -> Outcome<()>;
}

/// A typed pipe: handler plus codecs
pub struct Pipe<T> {
    pipe_type: PipeType,
    url: Option<String>,
    handler: Arc<dyn PipeHandler>,
    request_builder: Arc<dyn RequestBuilder<T>>,
    response_parser: Arc<dyn ResponseParser<T>>,
}

impl<T> Pipe<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Pipe with JSON codecs
    #[must_use]
    pub fn json(pipe_type: PipeType, handler: Arc<dyn PipeHandler>) -> Self {
        Self::with_codecs(
            pipe_type,
            handler,
            Arc::new(JsonRequestBuilder::new()),
            Arc::new(JsonResponseParser::new()),
        )
    }
}

impl<T> Pipe<T> {
    #[must_use]
    pub fn with_codecs(
        pipe_type: PipeType,
        handler: Arc<dyn PipeHandler>,
        request_builder: Arc<dyn RequestBuilder<T>>,
        response_parser: Arc<dyn ResponseParser<T>>,
    ) -> Self {
        Self {
            pipe_type,
            url: None,
            handler,
            request_builder,
            response_parser,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn pipe_type(&self) -> &PipeType {
        &self.pipe_type
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn PipeHandler> {
        &self.handler
    }

    #[must_use]
    pub fn request_builder(&self) -> &Arc<dyn RequestBuilder<T>> {
        &self.request_builder
    }

    #[must_use]
    pub fn response_parser(&self) -> &Arc<dyn ResponseParser<T>> {
        &self.response_parser
    }

    /// Read items, optionally filtered
    ///
    /// # Errors
    /// Propagates the handler's failure or a decoding failure
    pub fn read(&self, filter: Option<&ReadFilter>) -> Outcome<Vec<T>> {
        let body = self.handler.on_read(filter)?;
        self.response_parser.handle_array_response(&body)
    }

    /// Save an already encoded item and return the stored body
    ///
    /// # Errors
    /// Propagates the handler's failure
    pub fn save(&self, body: &[u8]) -> Outcome<Vec<u8>> {
        self.handler.on_save(body)
    }

    /// Remove the item with the given id
    ///
    /// # Errors
    /// Propagates the handler's failure
    pub fn remove(&self, id: &str) -> Outcome<()> {
        self.handler.on_remove(id)
    }
}
