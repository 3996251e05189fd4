use crate::error::{Result, WatchError};
use std::collections::BTreeMap;
use tracing::warn;

/// Caller-owned mapping from lowercase keyword to target label.
///
/// The matcher only reads the keyword set; labels are for the caller.
/// Keywords iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: BTreeMap<String, String>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `keyword` (trimmed, lowercased) for `label`, returning the
    /// label it replaced.
    pub fn insert(&mut self, keyword: &str, label: impl Into<String>) -> Result<Option<String>> {
        let keyword = normalize_keyword(keyword)?;
        Ok(self.targets.insert(keyword, label.into()))
    }

    pub fn remove(&mut self, keyword: &str) -> Option<String> {
        self.targets.remove(&keyword.trim().to_lowercase())
    }

    pub fn label(&self, keyword: &str) -> Option<&str> {
        self.targets.get(keyword).map(String::as_str)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

pub fn normalize_keyword(keyword: &str) -> Result<String> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Err(WatchError::InvalidKeyword(keyword));
    }
    Ok(keyword)
}

/// Skips (and logs) empty keywords.
impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for TargetRegistry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (keyword, label) in iter {
            if let Err(e) = registry.insert(keyword.as_ref(), label) {
                warn!(error = %e, "Skipping target");
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_normalized() {
        let mut registry = TargetRegistry::new();
        registry.insert("  Chrome ", "Browser").unwrap();
        assert_eq!(registry.label("chrome"), Some("Browser"));
        assert_eq!(registry.keywords().collect::<Vec<_>>(), vec!["chrome"]);
    }

    #[test]
    fn empty_keyword_is_rejected() {
        let mut registry = TargetRegistry::new();
        assert!(matches!(
            registry.insert("   ", "Nothing"),
            Err(WatchError::InvalidKeyword(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn insert_replaces_label() {
        let mut registry = TargetRegistry::new();
        registry.insert("code", "Editor").unwrap();
        let previous = registry.insert("CODE", "IDE").unwrap();
        assert_eq!(previous.as_deref(), Some("Editor"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove("Code").as_deref(), Some("IDE"));
    }

    #[test]
    fn collects_and_skips_invalid() {
        let registry: TargetRegistry = [("spotify", "Music"), ("", "Broken"), ("Code", "Editor")]
            .into_iter()
            .collect();
        assert_eq!(
            registry.iter().collect::<Vec<_>>(),
            vec![("code", "Editor"), ("spotify", "Music")]
        );
    }
}
