use std::fmt;

use crate::api::Args;

/// Identity of a cached result-set: operation name plus canonical arguments.
///
/// `Args` is ordered and carries only the fields that were set, so two
/// equivalent filters render the same key. Values are percent-encoded, so
/// free text such as a search term cannot forge a separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(name: &str, args: &Args) -> Self {
        let rendered = args
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("{}({})", name, rendered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
