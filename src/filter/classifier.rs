//! Byte-signature classification.
//!
//! The signature database is an opaque dependency (`infer`); this module only
//! fixes the contract the inference filter relies on.

use thiserror::Error;

/// Errors a classifier can report. All of them are non-fatal for the response.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// No classifier handle was initialised for this worker.
    #[error("signature classifier unavailable")]
    Unavailable,

    /// The classifier produced something that is not a MIME type.
    #[error("classifier returned invalid media type: {0}")]
    InvalidMime(String),
}

impl ClassifyError {
    /// Whether this is a classifier fault rather than a configured absence.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ClassifyError::Unavailable)
    }
}

/// Guess a MIME type from leading bytes.
///
/// Implementations must not block on I/O and must return `Ok(None)` for
/// empty, truncated or unrecognised input.
pub trait Classifier: Send + Sync {
    fn classify(&self, buf: &[u8]) -> Result<Option<String>, ClassifyError>;
}

/// Classifier backed by the `infer` matcher set.
pub struct InferClassifier {
    inner: infer::Infer,
}

impl InferClassifier {
    pub fn new() -> Self {
        Self {
            inner: infer::Infer::new(),
        }
    }
}

impl Default for InferClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InferClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferClassifier").finish_non_exhaustive()
    }
}

impl Classifier for InferClassifier {
    fn classify(&self, buf: &[u8]) -> Result<Option<String>, ClassifyError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let Some(kind) = self.inner.get(buf) else {
            return Ok(None);
        };
        let mime = kind.mime_type();
        if mime.parse::<mime_guess::mime::Mime>().is_err() {
            return Err(ClassifyError::InvalidMime(mime.to_string()));
        }
        Ok(Some(mime.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_a_failure() {
        assert!(!ClassifyError::Unavailable.is_failure());
        assert!(ClassifyError::InvalidMime("x".into()).is_failure());
    }

    #[test]
    fn test_png_signature() {
        let classifier = InferClassifier::new();
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(classifier.classify(png).unwrap().as_deref(), Some("image/png"));
    }

    #[test]
    fn test_pdf_signature() {
        let classifier = InferClassifier::new();
        let pdf = b"%PDF-1.5\n%\xe2\xe3\xcf\xd3";
        assert_eq!(
            classifier.classify(pdf).unwrap().as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_no_opinion() {
        let classifier = InferClassifier::new();
        assert_eq!(classifier.classify(b"").unwrap(), None);
        assert_eq!(classifier.classify(b"plain words, nothing magic").unwrap(), None);
    }
}
