// PostgreSQL catalog
//
// A run holds exactly one pooled connection (acquired in PgCatalog::acquire,
// returned to the pool on drop) and opens one transaction per record on it.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, FromRow, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use super::models::{Author, CatalogCounts, Category, Item, NewAuthor};
use super::{Catalog, CatalogTx};
use crate::config::DbConfig;
use crate::error::{StoreError, StoreResult};

/// Create the connection pool and bring the schema up to date
pub async fn connect(config: &DbConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect(&config.url)
        .await
        .map_err(classify)?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| StoreError::Database(e.into()))?;

    info!(max_connections = config.max_connections, "Catalog database ready");
    Ok(pool)
}

/// Map sqlx errors onto store error kinds
pub fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            StoreError::Constraint(db.message().to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::ConnectionLost(err.to_string())
        }
        _ => StoreError::Database(err),
    }
}

pub struct PgCatalog {
    conn: PoolConnection<Postgres>,
}

impl PgCatalog {
    /// Take one connection out of the pool for the lifetime of the session
    pub async fn acquire(pool: &PgPool) -> StoreResult<Self> {
        let conn = pool.acquire().await.map_err(classify)?;
        debug!("Acquired catalog session connection");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn begin<'a>(&'a mut self) -> StoreResult<Box<dyn CatalogTx + 'a>> {
        let tx = self.conn.begin().await.map_err(classify)?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

pub struct PgTx<'c> {
    tx: Option<Transaction<'c, Postgres>>,
}

impl PgTx<'_> {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }

    async fn insert_links(
        &mut self,
        table: &str,
        column: &str,
        item_id: i64,
        ids: &[i64],
    ) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (item_id, {}, position) ", table, column));
        query_builder.push_values(ids.iter().enumerate(), |mut b, (position, id)| {
            b.push_bind(item_id)
                .push_bind(*id)
                .push_bind(position as i32);
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        query_builder
            .build()
            .execute(self.conn()?)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: i64,
    title: String,
    release_date: Option<chrono::NaiveDate>,
    resource_link: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    language: Option<String>,
}

#[async_trait]
impl<'c> CatalogTx for PgTx<'c> {
    async fn author_by_name(&mut self, name: &str) -> StoreResult<Option<Author>> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, birth_year, death_year FROM authors WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.conn()?)
        .await
        .map_err(classify)
    }

    async fn author_exists(&mut self, id: i64) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM authors WHERE id = $1)")
            .bind(id)
            .fetch_one(self.conn()?)
            .await
            .map_err(classify)
    }

    async fn insert_author(&mut self, author: &NewAuthor) -> StoreResult<Author> {
        sqlx::query_as::<_, Author>(
            r#"
            INSERT INTO authors (id, name, birth_year, death_year)
            VALUES (COALESCE($1, nextval('author_local_id_seq')), $2, $3, $4)
            RETURNING id, name, birth_year, death_year
            "#,
        )
        .bind(author.id)
        .bind(&author.name)
        .bind(author.birth_year)
        .bind(author.death_year)
        .fetch_one(self.conn()?)
        .await
        .map_err(classify)
    }

    async fn category_by_name(&mut self, name: &str) -> StoreResult<Option<Category>> {
        sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = $1")
            .bind(name)
            .fetch_optional(self.conn()?)
            .await
            .map_err(classify)
    }

    async fn insert_category(&mut self, name: &str) -> StoreResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(self.conn()?)
        .await
        .map_err(classify)
    }

    async fn item_by_id(&mut self, id: i64) -> StoreResult<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, title, release_date, resource_link, summary, content, language
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(classify)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let author_ids = sqlx::query_scalar::<_, i64>(
            "SELECT author_id FROM item_authors WHERE item_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(self.conn()?)
        .await
        .map_err(classify)?;

        let category_ids = sqlx::query_scalar::<_, i64>(
            "SELECT category_id FROM item_categories WHERE item_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(self.conn()?)
        .await
        .map_err(classify)?;

        Ok(Some(Item {
            id: row.id,
            title: row.title,
            release_date: row.release_date,
            resource_link: row.resource_link,
            summary: row.summary,
            content: row.content,
            language: row.language,
            author_ids,
            category_ids,
        }))
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, title, release_date, resource_link, summary, content, language)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(item.release_date)
        .bind(&item.resource_link)
        .bind(&item.summary)
        .bind(&item.content)
        .bind(&item.language)
        .execute(self.conn()?)
        .await
        .map_err(classify)?;

        self.insert_links("item_authors", "author_id", item.id, &item.author_ids)
            .await?;
        self.insert_links("item_categories", "category_id", item.id, &item.category_ids)
            .await
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE items
            SET title = $2,
                release_date = $3,
                resource_link = $4,
                summary = $5,
                content = $6,
                language = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(item.release_date)
        .bind(&item.resource_link)
        .bind(&item.summary)
        .bind(&item.content)
        .bind(&item.language)
        .execute(self.conn()?)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn set_item_authors(&mut self, item_id: i64, author_ids: &[i64]) -> StoreResult<()> {
        sqlx::query("DELETE FROM item_authors WHERE item_id = $1")
            .bind(item_id)
            .execute(self.conn()?)
            .await
            .map_err(classify)?;
        self.insert_links("item_authors", "author_id", item_id, author_ids)
            .await
    }

    async fn set_item_categories(
        &mut self,
        item_id: i64,
        category_ids: &[i64],
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM item_categories WHERE item_id = $1")
            .bind(item_id)
            .execute(self.conn()?)
            .await
            .map_err(classify)?;
        self.insert_links("item_categories", "category_id", item_id, category_ids)
            .await
    }

    async fn delete_item(&mut self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_author(&mut self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&mut self) -> StoreResult<CatalogCounts> {
        let (authors, categories, items) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM authors),
                (SELECT COUNT(*) FROM categories),
                (SELECT COUNT(*) FROM items)
            "#,
        )
        .fetch_one(self.conn()?)
        .await
        .map_err(classify)?;

        Ok(CatalogCounts {
            authors,
            categories,
            items,
        })
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await.map_err(classify)
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await.map_err(classify)
    }
}
