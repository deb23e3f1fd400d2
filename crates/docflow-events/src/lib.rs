//! # Docflow Events
//!
//! Object-created upload events. An event carries `(document_id, filename,
//! object_key)` derived from an object key of the form
//! `document_id/filename`; keys arrive URL-encoded from S3-compatible
//! notification payloads and are decoded and normalized here.
//!
//! The in-process source decouples the HTTP ingress from the intake runtime:
//! the ingress publishes, the intake pump consumes.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio::sync::mpsc;

use docflow_core::types::DocumentId;

/// One object-created notification, ready to start a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEvent {
    pub document_id: DocumentId,
    pub filename: String,
    pub object_key: String,
}

impl UploadEvent {
    /// Build an event from a raw (still URL-encoded) object key.
    pub fn from_encoded_key(encoded: &str) -> Result<Self, EventError> {
        let object_key = decode_object_key(encoded)?;
        let (document_id, filename) = parse_object_key(&object_key)?;
        Ok(Self {
            document_id,
            filename,
            object_key,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("object key is empty")]
    EmptyKey,

    #[error("object key {0:?} is not valid UTF-8 after decoding")]
    UndecodableKey(String),

    #[error("object key {0:?} does not match document_id/filename")]
    MalformedKey(String),

    #[error("event source closed")]
    SourceClosed,
}

/// URL-decode a notification object key ('+' means space in query encoding).
pub fn decode_object_key(encoded: &str) -> Result<String, EventError> {
    let plus_decoded = encoded.replace('+', " ");
    let decoded = percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map_err(|_| EventError::UndecodableKey(encoded.to_string()))?;
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        return Err(EventError::EmptyKey);
    }
    Ok(trimmed.to_string())
}

/// Split a normalized object key into `(document_id, filename)`.
pub fn parse_object_key(object_key: &str) -> Result<(DocumentId, String), EventError> {
    let cleaned = object_key.replace('\\', "/");
    let cleaned = cleaned.trim_matches('/');
    let (document_id, filename) = cleaned
        .split_once('/')
        .ok_or_else(|| EventError::MalformedKey(object_key.to_string()))?;
    let document_id = document_id.trim();
    let filename = filename.trim();
    if document_id.is_empty() || filename.is_empty() {
        return Err(EventError::MalformedKey(object_key.to_string()));
    }
    Ok((DocumentId::new(document_id), filename.to_string()))
}

/// A stream of upload events.
#[async_trait]
pub trait UploadEventSource: Send {
    /// Next event, or `None` once the source is closed.
    async fn recv(&mut self) -> Option<UploadEvent>;
}

/// Publishing half of the in-process source.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: UploadEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::SourceClosed)
    }
}

/// Consuming half of the in-process source.
pub struct InProcessEventSource {
    rx: mpsc::UnboundedReceiver<UploadEvent>,
}

#[async_trait]
impl UploadEventSource for InProcessEventSource {
    async fn recv(&mut self) -> Option<UploadEvent> {
        self.rx.recv().await
    }
}

/// Create a connected publisher/source pair.
pub fn channel() -> (EventPublisher, InProcessEventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventPublisher { tx }, InProcessEventSource { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_key() {
        let event = UploadEvent::from_encoded_key("doc-123/payslip.txt").unwrap();
        assert_eq!(event.document_id.as_str(), "doc-123");
        assert_eq!(event.filename, "payslip.txt");
        assert_eq!(event.object_key, "doc-123/payslip.txt");
    }

    #[test]
    fn test_parse_url_encoded_key() {
        let event = UploadEvent::from_encoded_key("doc-123/pay%20slip+Q1.txt").unwrap();
        assert_eq!(event.filename, "pay slip Q1.txt");
    }

    #[test]
    fn test_parse_backslash_and_surrounding_slashes() {
        let (id, filename) = parse_object_key("/doc-123\\nested\\file.txt/").unwrap();
        assert_eq!(id.as_str(), "doc-123");
        assert_eq!(filename, "nested/file.txt");
    }

    #[test]
    fn test_filename_may_contain_further_slashes() {
        let (id, filename) = parse_object_key("doc-123/2025/01/payslip.txt").unwrap();
        assert_eq!(id.as_str(), "doc-123");
        assert_eq!(filename, "2025/01/payslip.txt");
    }

    #[test]
    fn test_rejects_keys_without_filename() {
        assert_eq!(
            parse_object_key("doc-123"),
            Err(EventError::MalformedKey("doc-123".to_string()))
        );
        assert_eq!(
            parse_object_key("doc-123/   "),
            Err(EventError::MalformedKey("doc-123/   ".to_string()))
        );
        assert_eq!(decode_object_key("  "), Err(EventError::EmptyKey));
    }

    #[test]
    fn test_in_process_source_delivers_in_order() {
        tokio_test::block_on(async {
            let (publisher, mut source) = channel();
            let first = UploadEvent::from_encoded_key("a/1.txt").unwrap();
            let second = UploadEvent::from_encoded_key("b/2.txt").unwrap();
            publisher.publish(first.clone()).unwrap();
            publisher.publish(second.clone()).unwrap();
            drop(publisher);

            assert_eq!(source.recv().await, Some(first));
            assert_eq!(source.recv().await, Some(second));
            assert_eq!(source.recv().await, None);
        });
    }
}
