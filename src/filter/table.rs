//! Static extension-to-type table.
//!
//! # Responsibilities
//! - Map the extension of a lookup key (the request path) to a MIME type
//! - Apply configured extension overrides before the built-in database
//! - Report the route's default type as an explicit "inconclusive" result

use std::collections::HashMap;
use std::path::Path;

/// Outcome of a table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLookup {
    /// The resolved type, or the default type when nothing matched.
    pub mime: String,
    /// True when the table had no better answer than the default type.
    pub is_default: bool,
}

impl TableLookup {
    fn default_type(default_type: &str) -> Self {
        Self {
            mime: default_type.to_string(),
            is_default: true,
        }
    }
}

/// Read-only extension lookup.
pub trait TypeTable: Send + Sync {
    /// Resolve `key` to a MIME type, falling back to `default_type`.
    fn resolve_by_extension(&self, key: &str, default_type: &str) -> TableLookup;
}

/// Table backed by `mime_guess` plus per-deployment overrides.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    overrides: HashMap<String, String>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table with extension overrides (`"js" -> "application/javascript"`).
    /// Extensions are matched case-insensitively, with or without a leading dot.
    pub fn with_overrides<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let overrides = overrides
            .into_iter()
            .map(|(ext, mime)| (normalize_ext(ext.as_ref()), mime.into()))
            .collect();
        Self { overrides }
    }

    fn lookup_ext(&self, ext: &str) -> Option<String> {
        let ext = normalize_ext(ext);
        if let Some(mime) = self.overrides.get(&ext) {
            return Some(mime.clone());
        }
        mime_guess::from_ext(&ext).first_raw().map(str::to_string)
    }
}

impl TypeTable for ExtensionTable {
    fn resolve_by_extension(&self, key: &str, default_type: &str) -> TableLookup {
        let Some(ext) = Path::new(key).extension().and_then(|e| e.to_str()) else {
            return TableLookup::default_type(default_type);
        };

        match self.lookup_ext(ext) {
            Some(mime) if !mime.eq_ignore_ascii_case(default_type) => TableLookup {
                mime,
                is_default: false,
            },
            _ => TableLookup::default_type(default_type),
        }
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}
