use crate::error::{Result, SuiteError};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
struct Entry {
    hook: String,
    target: Arc<dyn Any + Send + Sync>,
}

/// Named entry points, each bound to exactly one hook
#[derive(Clone, Default)]
pub struct EntryMap {
    entries: BTreeMap<String, Entry>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `target`, owned by the hook called `hook`
    ///
    /// Names are unique: binding an existing name fails and leaves the map
    /// untouched.
    pub fn insert<H: Send + Sync + 'static>(
        &mut self,
        name: &str,
        hook: &str,
        target: Arc<H>,
    ) -> Result<()> {
        if let Some(existing) = self.entries.get(name) {
            return Err(SuiteError::DuplicateEntry {
                name: name.to_string(),
                existing: existing.hook.clone(),
                hook: hook.to_string(),
            });
        }
        self.entries.insert(
            name.to_string(),
            Entry {
                hook: hook.to_string(),
                target,
            },
        );
        Ok(())
    }

    /// Resolve `name` to the hook it is bound to
    pub fn get<H: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<H>> {
        let entry = self.entries.get(name).ok_or_else(|| SuiteError::UnknownEntry {
            name: name.to_string(),
        })?;
        Arc::clone(&entry.target)
            .downcast::<H>()
            .map_err(|_| SuiteError::EntryTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<H>().to_string(),
            })
    }

    /// Name of the hook that owns `name`
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.hook.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut map = EntryMap::new();
        map.insert("health", "alpha", Arc::new(Alpha)).unwrap();

        let err = map.insert("health", "beta", Arc::new(Beta)).unwrap_err();
        assert!(matches!(
            err,
            SuiteError::DuplicateEntry { ref existing, ref hook, .. } if existing == "alpha" && hook == "beta"
        ));
        assert_eq!(map.owner("health"), Some("alpha"));
    }

    #[test]
    fn test_lookup_errors_name_the_entry() {
        let mut map = EntryMap::new();
        map.insert("health", "alpha", Arc::new(Alpha)).unwrap();

        assert!(map.get::<Alpha>("health").is_ok());
        assert!(matches!(map.get::<Beta>("health"), Err(SuiteError::EntryTypeMismatch { .. })));
        assert!(matches!(map.get::<Alpha>("nope"), Err(SuiteError::UnknownEntry { .. })));
    }
}
