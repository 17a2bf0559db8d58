// In-memory catalog
//
// Same transactional contract as the PostgreSQL store: a unit of work
// either commits as a whole or leaves nothing behind. Writes go straight
// to the shared state and each one records its inverse in an undo log;
// rollback (or dropping an uncommitted unit) replays the log newest-first,
// commit just discards it. Only the rows a unit touches are ever copied.
//
// Cloning a MemoryCatalog yields another handle on the same state, so tests
// can keep one for inspection while the pipeline owns the other. Handles
// see writes of an open unit before it commits.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::{Author, CatalogCounts, Category, Item, NewAuthor};
use super::{Catalog, CatalogTx};
use crate::error::{StoreError, StoreResult};

/// First id handed out to authors without a usable source id
pub const LOCAL_AUTHOR_ID_START: i64 = 1_000_000_000;

#[derive(Debug)]
struct State {
    authors: BTreeMap<i64, Author>,
    author_ids_by_name: HashMap<String, i64>,
    categories: BTreeMap<i64, Category>,
    category_ids_by_name: HashMap<String, i64>,
    items: BTreeMap<i64, Item>,
    next_author_id: i64,
    next_category_id: i64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            authors: BTreeMap::new(),
            author_ids_by_name: HashMap::new(),
            categories: BTreeMap::new(),
            category_ids_by_name: HashMap::new(),
            items: BTreeMap::new(),
            next_author_id: LOCAL_AUTHOR_ID_START,
            next_category_id: 1,
        }
    }
}

impl State {
    fn put_author(&mut self, author: Author) {
        self.author_ids_by_name.insert(author.name.clone(), author.id);
        self.authors.insert(author.id, author);
    }

    fn take_author(&mut self, id: i64) -> Option<Author> {
        let author = self.authors.remove(&id)?;
        self.author_ids_by_name.remove(&author.name);
        Some(author)
    }

    fn put_category(&mut self, category: Category) {
        self.category_ids_by_name
            .insert(category.name.clone(), category.id);
        self.categories.insert(category.id, category);
    }

    fn take_category(&mut self, id: i64) -> Option<Category> {
        let category = self.categories.remove(&id)?;
        self.category_ids_by_name.remove(&category.name);
        Some(category)
    }

    fn check_links(&self, author_ids: &[i64], category_ids: &[i64]) -> StoreResult<()> {
        if let Some(id) = author_ids.iter().find(|id| !self.authors.contains_key(id)) {
            return Err(StoreError::Constraint(format!("unknown author {}", id)));
        }
        if let Some(id) = category_ids
            .iter()
            .find(|id| !self.categories.contains_key(id))
        {
            return Err(StoreError::Constraint(format!("unknown category {}", id)));
        }
        Ok(())
    }
}

/// Inverse of one write
#[derive(Debug)]
enum Undo {
    RemoveAuthor(i64),
    RestoreAuthor(Author),
    RemoveCategory(i64),
    RemoveItem(i64),
    RestoreItem(Item),
}

impl Undo {
    fn revert(self, state: &mut State) {
        match self {
            Undo::RemoveAuthor(id) => {
                state.take_author(id);
            }
            Undo::RestoreAuthor(author) => state.put_author(author),
            Undo::RemoveCategory(id) => {
                state.take_category(id);
            }
            Undo::RemoveItem(id) => {
                state.items.remove(&id);
            }
            Undo::RestoreItem(item) => {
                state.items.insert(item.id, item);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    rejected_items: HashSet<i64>,
    disconnected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of item `id` fail with a constraint violation
    pub fn reject_item(&self, id: i64) {
        lock(&self.faults).rejected_items.insert(id);
    }

    /// Make every further operation fail as if the connection dropped
    pub fn disconnect(&self) {
        lock(&self.faults).disconnected = true;
    }

    pub fn authors(&self) -> Vec<Author> {
        lock(&self.state).authors.values().cloned().collect()
    }

    pub fn categories(&self) -> Vec<Category> {
        lock(&self.state).categories.values().cloned().collect()
    }

    pub fn items(&self) -> Vec<Item> {
        lock(&self.state).items.values().cloned().collect()
    }

    pub fn item(&self, id: i64) -> Option<Item> {
        lock(&self.state).items.get(&id).cloned()
    }

    fn check_connected(&self) -> StoreResult<()> {
        if lock(&self.faults).disconnected {
            return Err(StoreError::ConnectionLost(
                "memory catalog disconnected".into(),
            ));
        }
        Ok(())
    }

    fn check_item_allowed(&self, id: i64) -> StoreResult<()> {
        if lock(&self.faults).rejected_items.contains(&id) {
            return Err(StoreError::Constraint(format!("item {} rejected", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn begin<'a>(&'a mut self) -> StoreResult<Box<dyn CatalogTx + 'a>> {
        self.check_connected()?;
        Ok(Box::new(MemoryTx::new(self)))
    }
}

pub struct MemoryTx<'a> {
    catalog: &'a MemoryCatalog,
    undo: Vec<Undo>,
    open: bool,
}

impl<'a> MemoryTx<'a> {
    fn new(catalog: &'a MemoryCatalog) -> Self {
        Self {
            catalog,
            undo: Vec::new(),
            open: true,
        }
    }

    /// Shared state, if this unit is still open and the catalog reachable
    fn state(&self) -> StoreResult<MutexGuard<'a, State>> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        let catalog: &'a MemoryCatalog = self.catalog;
        catalog.check_connected()?;
        Ok(lock(&catalog.state))
    }

    fn revert(&mut self) {
        let mut state = lock(&self.catalog.state);
        while let Some(undo) = self.undo.pop() {
            undo.revert(&mut state);
        }
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.open {
            self.revert();
        }
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[async_trait]
impl<'a> CatalogTx for MemoryTx<'a> {
    async fn author_by_name(&mut self, name: &str) -> StoreResult<Option<Author>> {
        let state = self.state()?;
        Ok(state
            .author_ids_by_name
            .get(name)
            .and_then(|id| state.authors.get(id))
            .cloned())
    }

    async fn author_exists(&mut self, id: i64) -> StoreResult<bool> {
        Ok(self.state()?.authors.contains_key(&id))
    }

    async fn insert_author(&mut self, author: &NewAuthor) -> StoreResult<Author> {
        let mut state = self.state()?;
        if state.author_ids_by_name.contains_key(&author.name) {
            return Err(StoreError::Constraint(format!(
                "duplicate author name '{}'",
                author.name
            )));
        }

        // like a database sequence, the counter is not rolled back
        let id = match author.id {
            Some(id) if state.authors.contains_key(&id) => {
                return Err(StoreError::Constraint(format!("duplicate author id {}", id)))
            }
            Some(id) => id,
            None => {
                let id = state.next_author_id;
                state.next_author_id += 1;
                id
            }
        };

        let stored = Author {
            id,
            name: author.name.clone(),
            birth_year: author.birth_year,
            death_year: author.death_year,
        };
        state.put_author(stored.clone());
        self.undo.push(Undo::RemoveAuthor(id));
        Ok(stored)
    }

    async fn category_by_name(&mut self, name: &str) -> StoreResult<Option<Category>> {
        let state = self.state()?;
        Ok(state
            .category_ids_by_name
            .get(name)
            .and_then(|id| state.categories.get(id))
            .cloned())
    }

    async fn insert_category(&mut self, name: &str) -> StoreResult<Category> {
        let mut state = self.state()?;
        if state.category_ids_by_name.contains_key(name) {
            return Err(StoreError::Constraint(format!(
                "duplicate category name '{}'",
                name
            )));
        }

        let category = Category {
            id: state.next_category_id,
            name: name.to_string(),
        };
        state.next_category_id += 1;
        state.put_category(category.clone());
        self.undo.push(Undo::RemoveCategory(category.id));
        Ok(category)
    }

    async fn item_by_id(&mut self, id: i64) -> StoreResult<Option<Item>> {
        Ok(self.state()?.items.get(&id).cloned())
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        self.catalog.check_item_allowed(item.id)?;
        let mut state = self.state()?;
        if state.items.contains_key(&item.id) {
            return Err(StoreError::Constraint(format!("duplicate item id {}", item.id)));
        }
        state.check_links(&item.author_ids, &item.category_ids)?;

        let mut stored = item.clone();
        stored.author_ids = dedup(&item.author_ids);
        stored.category_ids = dedup(&item.category_ids);
        state.items.insert(item.id, stored);
        self.undo.push(Undo::RemoveItem(item.id));
        Ok(())
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        self.catalog.check_item_allowed(item.id)?;
        let mut state = self.state()?;
        let Some(stored) = state.items.get_mut(&item.id) else {
            return Ok(());
        };

        self.undo.push(Undo::RestoreItem(stored.clone()));
        stored.title = item.title.clone();
        stored.release_date = item.release_date;
        stored.resource_link = item.resource_link.clone();
        stored.summary = item.summary.clone();
        stored.content = item.content.clone();
        stored.language = item.language.clone();
        Ok(())
    }

    async fn set_item_authors(&mut self, item_id: i64, author_ids: &[i64]) -> StoreResult<()> {
        let mut state = self.state()?;
        state.check_links(author_ids, &[])?;
        if let Some(item) = state.items.get_mut(&item_id) {
            self.undo.push(Undo::RestoreItem(item.clone()));
            item.author_ids = dedup(author_ids);
        }
        Ok(())
    }

    async fn set_item_categories(
        &mut self,
        item_id: i64,
        category_ids: &[i64],
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        state.check_links(&[], category_ids)?;
        if let Some(item) = state.items.get_mut(&item_id) {
            self.undo.push(Undo::RestoreItem(item.clone()));
            item.category_ids = dedup(category_ids);
        }
        Ok(())
    }

    async fn delete_item(&mut self, id: i64) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.items.remove(&id) {
            Some(item) => {
                self.undo.push(Undo::RestoreItem(item));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_author(&mut self, id: i64) -> StoreResult<bool> {
        let mut state = self.state()?;
        let Some(author) = state.take_author(id) else {
            return Ok(false);
        };
        self.undo.push(Undo::RestoreAuthor(author));

        for item in state.items.values_mut() {
            if item.author_ids.contains(&id) {
                self.undo.push(Undo::RestoreItem(item.clone()));
                item.author_ids.retain(|author_id| *author_id != id);
            }
        }
        Ok(true)
    }

    async fn counts(&mut self) -> StoreResult<CatalogCounts> {
        let state = self.state()?;
        Ok(CatalogCounts {
            authors: state.authors.len() as i64,
            categories: state.categories.len() as i64,
            items: state.items.len() as i64,
        })
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        self.catalog.check_connected()?;
        self.undo.clear();
        self.open = false;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }
        self.revert();
        self.open = false;
        Ok(())
    }
}
