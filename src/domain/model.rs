use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A dated source URL that passed an existence probe. Only the resolver
/// constructs these, so a `SourceReference` always points at a file that
/// was present when it was resolved.
#[derive(Debug, Clone)]
pub struct SourceReference {
    base_url: String,
    date: NaiveDate,
    url: Url,
}

impl SourceReference {
    pub(crate) fn new(base_url: impl Into<String>, date: NaiveDate, url: Url) -> Self {
        Self {
            base_url: base_url.into(),
            date,
            url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Metadata of one object as seen on a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub backend_id: String,
    pub container: String,
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl StoredObject {
    /// Picks the most recently modified object. Equal timestamps fall back
    /// to the lexically greatest key so repeated runs see the same winner.
    pub fn latest<I>(objects: I) -> Option<StoredObject>
    where
        I: IntoIterator<Item = StoredObject>,
    {
        objects.into_iter().max_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str, timestamp: i64) -> StoredObject {
        StoredObject {
            backend_id: "test".to_string(),
            container: "bucket".to_string(),
            key: key.to_string(),
            last_modified: DateTime::from_timestamp(timestamp, 0).unwrap(),
            size: 1,
        }
    }

    #[test]
    fn latest_returns_strict_maximum() {
        let objects = vec![object("a", 100), object("b", 300), object("c", 200)];
        let latest = StoredObject::latest(objects).unwrap();
        assert_eq!(latest.key, "b");
    }

    #[test]
    fn latest_breaks_timestamp_ties_by_key() {
        let objects = vec![object("b", 100), object("a", 100)];
        let latest = StoredObject::latest(objects).unwrap();
        assert_eq!(latest.key, "b");

        // same objects in the other order pick the same winner
        let objects = vec![object("a", 100), object("b", 100)];
        assert_eq!(StoredObject::latest(objects).unwrap().key, "b");
    }

    #[test]
    fn latest_of_empty_set_is_none() {
        assert!(StoredObject::latest(Vec::new()).is_none());
    }
}
