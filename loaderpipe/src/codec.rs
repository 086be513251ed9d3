//! Request and response codecs
//!
//! Serialisation happens at the pipe boundary only. `save` encodes the item
//! once, before dispatch, and the encoded body is what travels to the worker.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Outcome, PipeError};

/// Turns an item into a request body
pub trait RequestBuilder<T>: Send + Sync {
    /// Encode `item` as a request body
    ///
    /// # Errors
    /// Returns `PipeError::Codec` if the item cannot be encoded
    fn body(&self, item: &T) -> Result<Vec<u8>, PipeError>;

    /// MIME type of the produced bodies
    fn content_type(&self) -> &str;
}

/// Turns response bodies back into items
pub trait ResponseParser<T>: Send + Sync {
    /// Decode a single item
    ///
    /// # Errors
    /// Returns `PipeError::Codec` if the body is not a valid item
    fn handle_response(&self, body: &[u8]) -> Outcome<T>;

    /// Decode a sequence of items
    ///
    /// # Errors
    /// Returns `PipeError::Codec` if the body is not a valid item sequence
    fn handle_array_response(&self, body: &[u8]) -> Outcome<Vec<T>>;
}

/// JSON request builder backed by serde
pub struct JsonRequestBuilder<T> {
    _item: PhantomData<fn(&T)>,
}

impl<T> JsonRequestBuilder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for JsonRequestBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> RequestBuilder<T> for JsonRequestBuilder<T> {
    fn body(&self, item: &T) -> Result<Vec<u8>, PipeError> {
        Ok(serde_json::to_vec(item)?)
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

/// JSON response parser backed by serde
pub struct JsonResponseParser<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonResponseParser<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for JsonResponseParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResponseParser<T> for JsonResponseParser<T> {
    fn handle_response(&self, body: &[u8]) -> Outcome<T> {
        Ok(serde_json::from_slice(body)?)
    }

    fn handle_array_response(&self, body: &[u8]) -> Outcome<Vec<T>> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: u32,
        name: String,
    }

    #[test]
    fn body_then_parse_gives_back_the_item() {
        let builder = JsonRequestBuilder::<Widget>::new();
        let parser = JsonResponseParser::<Widget>::new();
        let item = Widget {
            id: 7,
            name: "sprocket".into(),
        };

        let body = builder.body(&item).unwrap();
        assert_eq!(parser.handle_response(&body).unwrap(), item);
        assert_eq!(builder.content_type(), "application/json");
    }

    #[test]
    fn array_response_keeps_order() {
        let parser = JsonResponseParser::<Widget>::new();
        let items = parser
            .handle_array_response(br#"[{"id":2,"name":"b"},{"id":1,"name":"a"}]"#)
            .unwrap();
        assert_eq!(items.iter().map(|w| w.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn malformed_body_is_a_codec_error() {
        let parser = JsonResponseParser::<Widget>::new();
        let err = parser.handle_response(b"{\"id\":").unwrap_err();
        assert!(matches!(err, PipeError::Codec(_)), "got {err:?}");
    }
}
