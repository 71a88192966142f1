//! HTTP transport boundary
//!
//! The adapter never opens connections itself. A `Transport` performs one
//! blocking request per call; pooling, TLS and retries are its concern.

use std::io::Write;

use crate::error::TransportError;

pub use crate::response::WireResponse;

/// Header name/value pairs sent with a request
pub type Headers = Vec<(String, String)>;

pub trait Transport: Send + Sync {
    /// POST `body` to `path` (path and query string, e.g. `/?database=db`)
    fn post(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<WireResponse, TransportError>;

    fn get(&self, path: &str) -> Result<WireResponse, TransportError>;

    /// POST and write the response body into `writer` instead of buffering it
    ///
    /// The returned response carries status and encoding with an empty body.
    /// The provided implementation buffers through `post`; transports that can
    /// stream should override it.
    fn post_to_writer(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
        writer: &mut dyn Write,
    ) -> Result<WireResponse, TransportError> {
        let response = self.post(path, body, headers)?;
        writer.write_all(&response.body)?;
        writer.flush()?;
        Ok(WireResponse {
            body: Vec::new(),
            ..response
        })
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<WireResponse, TransportError> {
        (**self).post(path, body, headers)
    }

    fn get(&self, path: &str) -> Result<WireResponse, TransportError> {
        (**self).get(path)
    }

    fn post_to_writer(
        &self,
        path: &str,
        body: &[u8],
        headers: &[(String, String)],
        writer: &mut dyn Write,
    ) -> Result<WireResponse, TransportError> {
        (**self).post_to_writer(path, body, headers, writer)
    }
}
