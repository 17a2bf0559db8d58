// Catalog entities

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

/// Author to insert; `id: None` lets the store assign one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthor {
    pub id: Option<i64>,
    pub name: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A catalog item with its ordered author and category links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub resource_link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub author_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

/// Scalar item fields offered by a later sighting
///
/// A field is written only when it is present and differs from the stored
/// value; `None` never clears anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub resource_link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
}

fn overwrite<T: PartialEq + Clone>(slot: &mut Option<T>, value: &Option<T>) -> bool {
    match value {
        Some(v) if slot.as_ref() != Some(v) => {
            *slot = Some(v.clone());
            true
        }
        _ => false,
    }
}

impl Item {
    /// Apply `update` in place and return the names of changed fields
    pub fn apply(&mut self, update: &ItemUpdate) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if let Some(title) = &update.title {
            if *title != self.title {
                self.title = title.clone();
                changed.push("title");
            }
        }
        if overwrite(&mut self.release_date, &update.release_date) {
            changed.push("release_date");
        }
        if overwrite(&mut self.resource_link, &update.resource_link) {
            changed.push("resource_link");
        }
        if overwrite(&mut self.summary, &update.summary) {
            changed.push("summary");
        }
        if overwrite(&mut self.content, &update.content) {
            changed.push("content");
        }
        if overwrite(&mut self.language, &update.language) {
            changed.push("language");
        }

        changed
    }
}

/// Row counts per entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub authors: i64,
    pub categories: i64,
    pub items: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        Item {
            id: 1342,
            title: "Pride and Prejudice".into(),
            release_date: NaiveDate::from_ymd_opt(1998, 6, 1),
            resource_link: None,
            summary: None,
            content: None,
            language: Some("en".into()),
            author_ids: vec![68],
            category_ids: vec![],
        }
    }

    #[test]
    fn test_none_never_overwrites() {
        let mut item = item();
        let changed = item.apply(&ItemUpdate::default());
        assert!(changed.is_empty());
        assert_eq!(item.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_different_value_overwrites() {
        let mut item = item();
        let changed = item.apply(&ItemUpdate {
            language: Some("fr".into()),
            ..Default::default()
        });
        assert_eq!(changed, vec!["language"]);
        assert_eq!(item.language.as_deref(), Some("fr"));
    }

    #[test]
    fn test_equal_values_are_not_changes() {
        let mut item = item();
        let changed = item.apply(&ItemUpdate {
            title: Some("Pride and Prejudice".into()),
            release_date: NaiveDate::from_ymd_opt(1998, 6, 1),
            summary: Some("Courtship in Regency England".into()),
            ..Default::default()
        });
        assert_eq!(changed, vec!["summary"]);
    }
}
