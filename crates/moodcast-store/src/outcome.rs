//! Outcome of a synchronized write.

use serde::Serialize;

/// Which store answered an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreSource {
    /// The remote system of record.
    Primary,
    /// The local store, because the remote failed.
    Fallback,
}

/// A write result tagged with the store that accepted it.
///
/// `warning` carries non-fatal trouble such as a failed local mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synced<T> {
    pub value: T,
    pub source: StoreSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl<T> Synced<T> {
    pub fn primary(value: T) -> Self {
        Self {
            value,
            source: StoreSource::Primary,
            warning: None,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            source: StoreSource::Fallback,
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.source == StoreSource::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Synced<U> {
        Synced {
            value: f(self.value),
            source: self.source,
            warning: self.warning,
        }
    }
}
