//! Models for the Jellyfin API responses and the stats shape the dashboard
//! consumes.

use serde::{Deserialize, Serialize};

/// User record from `/Users`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JellyfinUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One library view from `/Users/{id}/Views`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JellyfinView {
    pub id: String,
    pub name: String,
}

/// Paged item listing envelope.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total_record_count: Option<u64>,
}

impl<T> ItemsPage<T> {
    /// Prefer the server-side total, fall back to the page length. Stats
    /// queries send `Limit=0` and carry an empty page, so an absent count
    /// there degrades to zero.
    pub fn total(&self) -> u64 {
        self.total_record_count.unwrap_or(self.items.len() as u64)
    }
}

/// Aggregation state of one library in the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    Success,
    Error,
}

/// Per-library counts surfaced on the dashboard.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub name: String,
    pub total_items: u64,
    pub collection_count: u64,
    pub status: LibraryStatus,
}

impl LibraryStats {
    /// Placeholder entry for a library whose counts could not be fetched.
    pub fn errored(name: String) -> Self {
        LibraryStats {
            name,
            total_items: 0,
            collection_count: 0,
            status: LibraryStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_page_prefers_total_record_count() {
        let page: ItemsPage<serde_json::Value> = serde_json::from_str(
            r#"{"Items": [], "TotalRecordCount": 156}"#,
        )
        .unwrap();
        assert_eq!(page.total(), 156);
    }

    #[test]
    fn test_items_page_falls_back_to_length() {
        let page: ItemsPage<serde_json::Value> =
            serde_json::from_str(r#"{"Items": [{}, {}, {}]}"#).unwrap();
        assert_eq!(page.total(), 3);
    }

    #[test]
    fn test_user_parses_pascal_case() {
        let user: JellyfinUser =
            serde_json::from_str(r#"{"Id": "abc", "Name": "admin"}"#).unwrap();
        assert_eq!(user.id, "abc");
        assert_eq!(user.name, "admin");
    }
}
