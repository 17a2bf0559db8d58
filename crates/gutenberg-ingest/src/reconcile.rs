// Reconciliation of descriptor records into the catalog
//
// Authors and categories are deduplicated by name. Items are keyed by the
// ebook number: the first sighting inserts, later sightings apply an
// ItemUpdate and replace link sets only when the new set is non-empty and
// different. Each record is one catalog transaction.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogTx, Item, ItemUpdate, NewAuthor};
use crate::descriptor::{AuthorStub, MetadataRecord};
use crate::error::StoreResult;

/// Outcome of reconciling one record
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub item: Item,
    pub created: bool,
    pub changed_fields: Vec<&'static str>,
}

impl Reconciled {
    pub fn updated(&self) -> bool {
        !self.created && !self.changed_fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Upsert `record` (with its fetched `content`) and its related rows
    ///
    /// Everything happens in one unit of work; on error nothing from this
    /// call is kept.
    pub async fn reconcile(
        &self,
        catalog: &mut dyn Catalog,
        record: &MetadataRecord,
        content: Option<String>,
    ) -> StoreResult<Reconciled> {
        let mut tx = catalog.begin().await?;

        match self.reconcile_in(tx.as_mut(), record, content).await {
            Ok(reconciled) => {
                tx.commit().await?;
                Ok(reconciled)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        external_id = record.external_id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn reconcile_in(
        &self,
        tx: &mut dyn CatalogTx,
        record: &MetadataRecord,
        content: Option<String>,
    ) -> StoreResult<Reconciled> {
        let author_ids = resolve_authors(tx, &record.authors).await?;
        let category_ids = resolve_categories(tx, &record.categories).await?;
        let release_date = parse_release_date(record);

        let Some(mut item) = tx.item_by_id(record.external_id).await? else {
            let item = Item {
                id: record.external_id,
                title: record.title.clone(),
                release_date,
                resource_link: record.text_resource_url.clone(),
                summary: record.summary.clone(),
                content,
                language: record.language.clone(),
                author_ids,
                category_ids,
            };
            tx.insert_item(&item).await?;
            debug!(external_id = item.id, "Item created");

            return Ok(Reconciled {
                item,
                created: true,
                changed_fields: Vec::new(),
            });
        };

        let update = ItemUpdate {
            title: Some(record.title.clone()),
            release_date,
            resource_link: record.text_resource_url.clone(),
            summary: record.summary.clone(),
            content,
            language: record.language.clone(),
        };

        let mut changed_fields = item.apply(&update);
        if !changed_fields.is_empty() {
            tx.update_item(&item).await?;
        }

        if link_set_changed(&item.author_ids, &author_ids) {
            tx.set_item_authors(item.id, &author_ids).await?;
            item.author_ids = author_ids;
            changed_fields.push("authors");
        }
        if link_set_changed(&item.category_ids, &category_ids) {
            tx.set_item_categories(item.id, &category_ids).await?;
            item.category_ids = category_ids;
            changed_fields.push("categories");
        }

        if changed_fields.is_empty() {
            debug!(external_id = item.id, "Item unchanged");
        } else {
            debug!(external_id = item.id, fields = ?changed_fields, "Item updated");
        }

        Ok(Reconciled {
            item,
            created: false,
            changed_fields,
        })
    }
}

/// Find-or-create every author, returning ids in first-seen order
async fn resolve_authors(tx: &mut dyn CatalogTx, stubs: &[AuthorStub]) -> StoreResult<Vec<i64>> {
    let mut by_name: HashMap<&str, i64> = HashMap::new();
    let mut ids = Vec::with_capacity(stubs.len());

    for stub in stubs {
        let id = match by_name.get(stub.name.as_str()) {
            Some(id) => *id,
            None => {
                let id = match tx.author_by_name(&stub.name).await? {
                    Some(existing) => existing.id,
                    None => {
                        let preferred = match stub.external_id {
                            Some(id) if !tx.author_exists(id).await? => Some(id),
                            _ => None,
                        };
                        let author = tx
                            .insert_author(&NewAuthor {
                                id: preferred,
                                name: stub.name.clone(),
                                birth_year: stub.birth_year,
                                death_year: stub.death_year,
                            })
                            .await?;
                        debug!(author_id = author.id, name = %author.name, "Author created");
                        author.id
                    }
                };
                by_name.insert(stub.name.as_str(), id);
                id
            }
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids)
}

/// Find-or-create every category, returning ids in first-seen order
async fn resolve_categories(tx: &mut dyn CatalogTx, names: &[String]) -> StoreResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(names.len());

    for name in names {
        let id = match tx.category_by_name(name).await? {
            Some(existing) => existing.id,
            None => tx.insert_category(name).await?.id,
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids)
}

/// An empty resolved set never clears existing links
fn link_set_changed(current: &[i64], resolved: &[i64]) -> bool {
    if resolved.is_empty() {
        return false;
    }
    let current: HashSet<_> = current.iter().collect();
    let resolved: HashSet<_> = resolved.iter().collect();
    current != resolved
}

fn parse_release_date(record: &MetadataRecord) -> Option<NaiveDate> {
    let raw = record.release_date.as_deref()?.trim();
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(
                external_id = record.external_id,
                release_date = raw,
                error = %e,
                "Unparseable release date, ignoring"
            );
            None
        }
    }
}
