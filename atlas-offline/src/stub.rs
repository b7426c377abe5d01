//! Programmable file source for tests.
//!
//! Mirrors the real sources' delivery behavior: the response is computed
//! synchronously on the requesting thread (so test assertions about the
//! incoming resource run there) but delivered asynchronously through the
//! runtime, like a network completion would be.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::resource::{Resource, ResourceKind};
use crate::response::Response;
use crate::source::{deliver, new_slot, FileSource, RequestHandle, ResponseCallback};

type StubResponse = Box<dyn Fn(&Resource) -> Response + Send + Sync>;

/// A file source answering from per-kind closures. Kinds without a closure
/// answer NotFound.
///
/// # Example
///
/// ```ignore
/// let mut stub = StubFileSource::new();
/// stub.style_response = Some(Box::new(|resource| {
///     assert_eq!(resource.url, "http://example.com/style.json");
///     Response::from_data(r#"{ "version": 8 }"#)
/// }));
/// let source: Arc<dyn FileSource> = Arc::new(stub);
/// ```
pub struct StubFileSource {
    runtime: Handle,
    pub style_response: Option<StubResponse>,
    pub source_response: Option<StubResponse>,
    pub tile_response: Option<StubResponse>,
    pub glyphs_response: Option<StubResponse>,
    pub sprite_image_response: Option<StubResponse>,
    pub sprite_json_response: Option<StubResponse>,
    /// Fallback for every other kind.
    pub response: Option<StubResponse>,
}

impl StubFileSource {
    /// Must be created on a tokio runtime; deliveries are spawned onto it.
    pub fn new() -> Self {
        Self {
            runtime: Handle::current(),
            style_response: None,
            source_response: None,
            tile_response: None,
            glyphs_response: None,
            sprite_image_response: None,
            sprite_json_response: None,
            response: None,
        }
    }

    fn respond(&self, resource: &Resource) -> Response {
        let stub = match resource.kind {
            ResourceKind::Style => &self.style_response,
            ResourceKind::Source => &self.source_response,
            ResourceKind::Tile => &self.tile_response,
            ResourceKind::Glyphs => &self.glyphs_response,
            ResourceKind::SpriteImage => &self.sprite_image_response,
            ResourceKind::SpriteJson => &self.sprite_json_response,
            ResourceKind::Unknown => &self.response,
        };
        stub.as_ref()
            .or(self.response.as_ref())
            .map(|f| f(resource))
            .unwrap_or_else(Response::not_found)
    }
}

impl Default for StubFileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSource for StubFileSource {
    fn request(&self, resource: Resource, callback: ResponseCallback) -> RequestHandle {
        let response = self.respond(&resource);
        let slot = new_slot(callback);
        let delivery = Arc::clone(&slot);
        let task = self.runtime.spawn(async move {
            deliver(&delivery, response);
        });
        RequestHandle::new(slot, Some(task.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatches_by_kind() {
        let mut stub = StubFileSource::new();
        stub.style_response = Some(Box::new(|_| Response::from_data("style")));

        let (tx, rx) = mpsc::channel();
        let _handle = stub.request(
            Resource::style("http://example.com/style.json"),
            Box::new(move |response| {
                tx.send(response).unwrap();
            }),
        );
        assert_eq!(rx.recv().unwrap().data.as_deref(), Some(b"style".as_slice()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unstubbed_kind_is_not_found() {
        let stub = StubFileSource::new();
        let (tx, rx) = mpsc::channel();
        let _handle = stub.request(
            Resource::source("http://example.com/tiles.json"),
            Box::new(move |response| {
                tx.send(response).unwrap();
            }),
        );
        assert!(rx.recv().unwrap().error.is_some());
    }
}
