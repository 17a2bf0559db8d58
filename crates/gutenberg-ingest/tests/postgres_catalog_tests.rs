//! PostgreSQL catalog tests
//!
//! These start a PostgreSQL container and are ignored by default:
//! `cargo test -p gutenberg-ingest -- --ignored`

mod common;

use common::{author, record, TestPostgres};
use gutenberg_ingest::catalog::memory::LOCAL_AUTHOR_ID_START;
use gutenberg_ingest::catalog::{Catalog, NewAuthor, PgCatalog};
use gutenberg_ingest::{ReconciliationEngine, StoreError};

fn moby_dick() -> gutenberg_ingest::MetadataRecord {
    let mut r = record(2701, "Moby Dick; Or, The Whale");
    r.language = Some("en".into());
    r.release_date = Some("2001-07-01".into());
    r.authors = vec![author(Some(9), "Melville, Herman"), author(None, "Anonymous")];
    r.categories = vec!["Adventure".into(), "Best Books Ever Listings".into()];
    r
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reconcile_is_idempotent() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();
    let engine = ReconciliationEngine::new();

    let first = engine
        .reconcile(&mut catalog, &moby_dick(), Some("Call me Ishmael.".into()))
        .await
        .unwrap();
    let second = engine
        .reconcile(&mut catalog, &moby_dick(), Some("Call me Ishmael.".into()))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert!(second.changed_fields.is_empty());

    let mut tx = catalog.begin().await.unwrap();
    let counts = tx.counts().await.unwrap();
    assert_eq!(counts.authors, 2);
    assert_eq!(counts.categories, 2);
    assert_eq!(counts.items, 1);

    let item = tx.item_by_id(2701).await.unwrap().unwrap();
    assert_eq!(item.author_ids[0], 9);
    assert!(item.author_ids[1] >= LOCAL_AUTHOR_ID_START);
    assert_eq!(item.content.as_deref(), Some("Call me Ishmael."));
    assert_eq!(item.release_date.unwrap().to_string(), "2001-07-01");
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_updates_fields_and_links() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();
    let engine = ReconciliationEngine::new();

    engine
        .reconcile(&mut catalog, &moby_dick(), None)
        .await
        .unwrap();

    let mut revised = moby_dick();
    revised.summary = Some("A whaling voyage.".into());
    revised.categories = vec!["Sea Stories".into()];
    let outcome = engine.reconcile(&mut catalog, &revised, None).await.unwrap();

    assert!(outcome.updated());
    assert!(outcome.changed_fields.contains(&"summary"));
    assert!(outcome.changed_fields.contains(&"categories"));

    let mut tx = catalog.begin().await.unwrap();
    let item = tx.item_by_id(2701).await.unwrap().unwrap();
    assert_eq!(item.summary.as_deref(), Some("A whaling voyage."));
    assert_eq!(item.category_ids.len(), 1);
    assert_eq!(item.language.as_deref(), Some("en"));
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_uncommitted_work_is_discarded() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();

    {
        let mut tx = catalog.begin().await.unwrap();
        tx.insert_category("Poetry").await.unwrap();
        tx.rollback().await.unwrap();
    }
    {
        let mut tx = catalog.begin().await.unwrap();
        tx.insert_category("Drama").await.unwrap();
        // dropped without commit
    }

    let mut tx = catalog.begin().await.unwrap();
    assert_eq!(tx.counts().await.unwrap().categories, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_author_name_is_constraint_violation() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();
    let mut tx = catalog.begin().await.unwrap();

    let first = tx
        .insert_author(&NewAuthor {
            id: None,
            name: "Homer".into(),
            birth_year: None,
            death_year: None,
        })
        .await
        .unwrap();
    assert_eq!(first.id, LOCAL_AUTHOR_ID_START);

    let err = tx
        .insert_author(&NewAuthor {
            id: Some(42),
            name: "Homer".into(),
            birth_year: None,
            death_year: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Constraint(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_item_cascades_links() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();

    ReconciliationEngine::new()
        .reconcile(&mut catalog, &moby_dick(), None)
        .await
        .unwrap();

    let mut tx = catalog.begin().await.unwrap();
    assert!(tx.delete_item(2701).await.unwrap());
    assert!(!tx.delete_item(2701).await.unwrap());
    tx.commit().await.unwrap();

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_authors")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(links, 0);

    // authors outlive their items
    let authors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(authors, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_author_unlinks_items() {
    let db = TestPostgres::start().await.unwrap();
    let mut catalog = PgCatalog::acquire(db.pool()).await.unwrap();

    ReconciliationEngine::new()
        .reconcile(&mut catalog, &moby_dick(), None)
        .await
        .unwrap();

    let mut tx = catalog.begin().await.unwrap();
    assert!(tx.delete_author(9).await.unwrap());
    let item = tx.item_by_id(2701).await.unwrap().unwrap();
    assert_eq!(item.author_ids.len(), 1);
    assert_ne!(item.author_ids[0], 9);
    tx.commit().await.unwrap();
}
