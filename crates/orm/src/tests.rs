//! Facade-level scenarios against the scripted driver
//!
//! These exercise the full path from typed call to issued SQL: hook order,
//! timestamp stamping, soft-delete behavior, scope application, and eager
//! loading, asserted at the statement protocol level.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::backend::{Dialect, ExecResult};
use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::events::{ChangeSet, ModelObserver};
use crate::model;
use crate::query::{QueryOperator, WhereCondition};
use crate::scope::GlobalScope;
use crate::test_support::{row, FakeDriver, FakeResponse};
use crate::value::DbValue;

model! {
    struct Account {
        pk id: i64,
        name: String,
        create_time: Option<DateTime<Utc>>,
        update_time: Option<DateTime<Utc>>,
        delete_time: Option<DateTime<Utc>>,
    }
    options { timestamps, soft_deletes }
}

model! {
    struct Item {
        pk id: i64,
        account_id: i64,
        label: String,
    }
}

fn account(name: &str) -> Account {
    Account {
        id: None,
        name: name.to_string(),
        create_time: None,
        update_time: None,
        delete_time: None,
    }
}

fn account_row(id: i64, name: &str, deleted: Option<DateTime<Utc>>) -> crate::row::Row {
    row(&[
        ("id", DbValue::Int64(id)),
        ("name", DbValue::String(name.to_string())),
        ("create_time", DbValue::DateTime(Utc::now())),
        ("update_time", DbValue::DateTime(Utc::now())),
        (
            "delete_time",
            deleted.map(DbValue::DateTime).unwrap_or(DbValue::Null),
        ),
    ])
}

fn item_row(id: i64, account_id: i64) -> crate::row::Row {
    row(&[
        ("id", DbValue::Int64(id)),
        ("account_id", DbValue::Int64(account_id)),
        ("label", DbValue::String("x".to_string())),
    ])
}

fn db_with(driver: FakeDriver) -> Database {
    Database::with_driver(Box::new(driver), DatabaseConfig::sqlite_in_memory())
}

struct NameLength;

#[async_trait]
impl ModelObserver<Account> for NameLength {
    async fn creating(&self, model: &mut Account) -> OrmResult<()> {
        if model.name.len() < 3 {
            return Err(OrmError::Validation("name too short".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn rejected_create_issues_no_sql() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());
    db.register_observer::<Account>(Arc::new(NameLength));

    let err = db.create(account("ab")).await.unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert!(driver.issued().is_empty());
}

#[tokio::test]
async fn create_stamps_timestamps_and_sets_key() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let saved = db.create(account("alice")).await.unwrap();
    // sqlite path: no RETURNING, key comes from last_insert_id
    assert_eq!(saved.id, Some(1));
    assert!(saved.create_time.is_some());
    assert_eq!(saved.create_time, saved.update_time);
    assert!(saved.delete_time.is_none());

    let issued = driver.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(
        issued[0].0,
        "INSERT INTO account (name, create_time, update_time, delete_time) \
         VALUES ($1, $2, $3, $4)"
    );
    assert_eq!(issued[0].1[0], DbValue::String("alice".into()));
    assert!(matches!(issued[0].1[1], DbValue::DateTime(_)));
    assert_eq!(issued[0].1[3], DbValue::Null);
}

#[tokio::test]
async fn create_uses_returning_on_postgres() {
    let driver = FakeDriver::with_dialect(Dialect::Postgres);
    driver.push_response(FakeResponse::Rows(vec![row(&[("id", DbValue::Int64(42))])]));
    let db = db_with(driver.clone());

    let saved = db.create(account("alice")).await.unwrap();
    assert_eq!(saved.id, Some(42));
    assert!(driver.issued_sql()[0].ends_with("RETURNING id"));
}

#[tokio::test]
async fn create_keeps_caller_supplied_timestamps() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let imported = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut model = account("alice");
    model.create_time = Some(imported);
    let saved = db.create(model).await.unwrap();

    assert_eq!(saved.create_time, Some(imported));
    // the stamp the caller left empty is still filled in
    assert!(saved.update_time.is_some());
    assert_ne!(saved.update_time, Some(imported));
    assert_eq!(driver.issued()[0].1[1], DbValue::DateTime(imported));
}

#[tokio::test]
async fn update_bumps_update_time_and_targets_pk() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let mut existing = account("alice");
    existing.id = Some(5);
    let before = existing.update_time;
    let saved = db.update(existing).await.unwrap();
    assert_ne!(saved.update_time, before);

    let issued = driver.issued();
    assert_eq!(
        issued[0].0,
        "UPDATE account SET name = $1, create_time = $2, update_time = $3, \
         delete_time = $4 WHERE id = $5"
    );
    assert_eq!(*issued[0].1.last().unwrap(), DbValue::Int64(5));
}

#[tokio::test]
async fn update_of_missing_row_is_not_found() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Exec(ExecResult {
        rows_affected: 0,
        last_insert_id: None,
    }));
    let db = db_with(driver);

    let mut existing = account("alice");
    existing.id = Some(999);
    assert!(matches!(
        db.update(existing).await,
        Err(OrmError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_without_key_fails_before_sql() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    assert!(matches!(
        db.update(account("alice")).await,
        Err(OrmError::MissingPrimaryKey)
    ));
    assert!(driver.issued().is_empty());
}

#[tokio::test]
async fn update_fields_writes_only_named_columns() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let mut existing = account("alice");
    existing.id = Some(5);
    let saved = db
        .update_fields(existing, &[("name", DbValue::String("bob".into()))])
        .await
        .unwrap();
    assert!(saved.update_time.is_some());
    assert_eq!(
        driver.issued_sql()[0],
        "UPDATE account SET name = $1, update_time = $2 WHERE id = $3"
    );
}

struct UppercaseNames;

#[async_trait]
impl ModelObserver<Account> for UppercaseNames {
    async fn updating(&self, _model: &mut Account, changes: &mut ChangeSet) -> OrmResult<()> {
        let upper = match changes.get("name") {
            Some(DbValue::String(name)) => Some(name.to_uppercase()),
            _ => None,
        };
        if let Some(upper) = upper {
            changes.set("name", upper);
        }
        Ok(())
    }
}

#[tokio::test]
async fn update_fields_fires_hooks_with_the_change_set() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());
    db.register_observer::<Account>(Arc::new(UppercaseNames));

    let mut existing = account("alice");
    existing.id = Some(5);
    db.update_fields(existing, &[("name", DbValue::String("bob".into()))])
        .await
        .unwrap();

    // the hook's edit is what reaches the database
    let issued = driver.issued();
    assert_eq!(
        issued[0].0,
        "UPDATE account SET name = $1, update_time = $2 WHERE id = $3"
    );
    assert_eq!(issued[0].1[0], DbValue::String("BOB".into()));
}

#[tokio::test]
async fn save_dispatches_on_key_presence() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let saved = db.save(account("alice")).await.unwrap();
    assert!(driver.issued_sql()[0].starts_with("INSERT INTO account"));

    db.save(saved).await.unwrap();
    assert!(driver.issued_sql()[1].starts_with("UPDATE account"));
}

#[tokio::test]
async fn find_filters_soft_deleted_rows() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![account_row(7, "alice", None)]));
    let db = db_with(driver.clone());

    let found = db.find::<Account>(7).await.unwrap().unwrap();
    assert_eq!(found.id, Some(7));
    assert_eq!(
        driver.issued_sql()[0],
        "SELECT * FROM account WHERE id = $1 AND delete_time IS NULL LIMIT 1"
    );
}

#[tokio::test]
async fn find_or_fail_reports_the_table() {
    let driver = FakeDriver::new();
    let db = db_with(driver);

    match db.find_or_fail::<Account>(7).await {
        Err(OrmError::NotFound(table)) => assert_eq!(table, "account"),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn delete_soft_deletes_and_is_idempotent() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![account_row(7, "alice", None)]));
    let db = db_with(driver.clone());

    db.delete::<Account>(7).await.unwrap();
    let issued = driver.issued();
    assert_eq!(issued.len(), 2);
    assert_eq!(issued[0].0, "SELECT * FROM account WHERE id = $1 LIMIT 1");
    assert_eq!(
        issued[1].0,
        "UPDATE account SET delete_time = $1 WHERE id = $2"
    );
    assert!(matches!(issued[1].1[0], DbValue::DateTime(_)));

    // already marked: no further write
    driver.push_response(FakeResponse::Rows(vec![account_row(
        7,
        "alice",
        Some(Utc::now()),
    )]));
    db.delete::<Account>(7).await.unwrap();
    assert_eq!(driver.issued().len(), 3);
}

#[tokio::test]
async fn delete_works_on_a_single_connection_pool() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![account_row(7, "alice", None)]));
    let db = Database::with_driver(
        Box::new(driver.clone()),
        DatabaseConfig::sqlite_in_memory()
            .pool_size(1)
            .acquire_timeout(Duration::from_millis(100)),
    );

    // the pre-read shares the one connection with the write
    db.delete::<Account>(7).await.unwrap();
    assert_eq!(driver.issued().len(), 2);
}

#[tokio::test]
async fn transactional_delete_reads_through_the_transaction() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let mut tx = db.begin().await.unwrap();
    driver.push_response(FakeResponse::Rows(vec![account_row(7, "alice", None)]));
    db.delete_in::<Account>(&mut tx, 7).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        driver.issued_sql(),
        vec![
            "BEGIN",
            "SELECT * FROM account WHERE id = $1 LIMIT 1",
            "UPDATE account SET delete_time = $1 WHERE id = $2",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn force_delete_removes_the_row() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![account_row(7, "alice", None)]));
    let db = db_with(driver.clone());

    db.force_delete::<Account>(7).await.unwrap();
    assert_eq!(
        driver.issued_sql()[1],
        "DELETE FROM account WHERE id = $1"
    );
}

#[tokio::test]
async fn delete_without_soft_policy_removes_the_row() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![item_row(3, 1)]));
    let db = db_with(driver.clone());

    db.delete::<Item>(3).await.unwrap();
    assert_eq!(driver.issued_sql()[1], "DELETE FROM item WHERE id = $1");
}

#[tokio::test]
async fn restore_clears_the_marker() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    db.restore::<Account>(7).await.unwrap();
    assert_eq!(
        driver.issued_sql()[0],
        "UPDATE account SET delete_time = NULL WHERE id = $1"
    );
    assert!(matches!(
        db.restore::<Item>(3).await,
        Err(OrmError::Query(_))
    ));
}

#[tokio::test]
async fn global_scope_applies_and_can_be_lifted() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());
    db.register_scope::<Item>(GlobalScope::new(
        "for_account",
        WhereCondition {
            column: "account_id".into(),
            operator: QueryOperator::Equal,
            value: Some(DbValue::Int64(1)),
            values: Vec::new(),
        },
    ));

    db.query::<Item>().get().await.unwrap();
    assert_eq!(
        driver.issued_sql()[0],
        "SELECT * FROM item WHERE account_id = $1"
    );

    db.query::<Item>()
        .without_scope("for_account")
        .get()
        .await
        .unwrap();
    assert_eq!(driver.issued_sql()[1], "SELECT * FROM item");
}

#[tokio::test]
async fn trashed_visibility_controls_the_filter() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    db.query::<Account>().get().await.unwrap();
    db.query::<Account>().with_trashed().get().await.unwrap();
    db.query::<Account>().only_trashed().get().await.unwrap();

    let issued = driver.issued_sql();
    assert_eq!(issued[0], "SELECT * FROM account WHERE delete_time IS NULL");
    assert_eq!(issued[1], "SELECT * FROM account");
    assert_eq!(
        issued[2],
        "SELECT * FROM account WHERE delete_time IS NOT NULL"
    );
}

#[tokio::test]
async fn count_and_exists_share_filters() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![row(&[(
        "count",
        DbValue::Int64(3),
    )])]));
    let db = db_with(driver.clone());

    let n = db
        .query::<Item>()
        .where_eq("account_id", 1i64)
        .count()
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(
        driver.issued_sql()[0],
        "SELECT COUNT(*) AS count FROM item WHERE account_id = $1"
    );

    driver.push_response(FakeResponse::Rows(vec![row(&[(
        "count",
        DbValue::Int64(0),
    )])]));
    assert!(!db.query::<Item>().exists().await.unwrap());
}

#[tokio::test]
async fn paginate_returns_total_and_page() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![row(&[(
        "count",
        DbValue::Int64(12),
    )])]));
    driver.push_response(FakeResponse::Rows(vec![item_row(1, 1), item_row(2, 1)]));
    let db = db_with(driver.clone());

    let page = db.query::<Item>().paginate(2, 2).await.unwrap();
    assert_eq!(page.total, 12);
    assert_eq!(page.items.len(), 2);
    assert_eq!(
        driver.issued_sql()[1],
        "SELECT * FROM item LIMIT 2 OFFSET 2"
    );
}

#[tokio::test]
async fn bulk_update_stamps_update_time() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    db.query::<Account>()
        .where_eq("name", "alice")
        .update(&[("name", DbValue::String("bob".into()))])
        .await
        .unwrap();
    assert_eq!(
        driver.issued_sql()[0],
        "UPDATE account SET name = $1, update_time = $2 \
         WHERE name = $3 AND delete_time IS NULL"
    );
}

#[tokio::test]
async fn bulk_delete_honors_soft_policy() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    db.query::<Account>()
        .where_eq("name", "alice")
        .delete()
        .await
        .unwrap();
    db.query::<Item>().where_eq("account_id", 1i64).delete().await.unwrap();

    let issued = driver.issued_sql();
    assert_eq!(
        issued[0],
        "UPDATE account SET delete_time = $1 WHERE name = $2 AND delete_time IS NULL"
    );
    assert_eq!(issued[1], "DELETE FROM item WHERE account_id = $1");
}

#[tokio::test]
async fn eager_load_batches_into_one_in_query() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![
        item_row(1, 10),
        item_row(2, 10),
        item_row(3, 11),
    ]));
    let db = db_with(driver.clone());

    let mut a = account("alice");
    a.id = Some(10);
    let mut b = account("bob");
    b.id = Some(11);

    let mut related = db
        .load_children::<Account, Item>(&[a, b], "account_id")
        .await
        .unwrap();
    assert_eq!(
        driver.issued_sql(),
        vec!["SELECT * FROM item WHERE account_id IN ($1, $2)"]
    );
    assert_eq!(related.take(10i64).len(), 2);
    assert_eq!(related.take(11i64).len(), 1);
    assert!(related.take(12i64).is_empty());
}

#[tokio::test]
async fn lazy_child_load_is_one_query_per_parent() {
    let driver = FakeDriver::new();
    driver.push_response(FakeResponse::Rows(vec![item_row(1, 10)]));
    let db = db_with(driver.clone());

    let mut parent = account("alice");
    parent.id = Some(10);
    let children: Vec<Item> = db.children_of(&parent, "account_id").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(
        driver.issued_sql(),
        vec!["SELECT * FROM item WHERE account_id = $1"]
    );
}

#[tokio::test]
async fn transactional_create_runs_inside_the_transaction() {
    let driver = FakeDriver::new();
    let db = db_with(driver.clone());

    let mut tx = db.begin().await.unwrap();
    let saved = db.create_in(&mut tx, account("alice")).await.unwrap();
    assert_eq!(saved.id, Some(1));
    tx.commit().await.unwrap();

    let issued = driver.issued_sql();
    assert_eq!(issued[0], "BEGIN");
    assert!(issued[1].starts_with("INSERT INTO account"));
    assert_eq!(issued[2], "COMMIT");
}

#[tokio::test]
async fn health_check_pings_a_pooled_connection() {
    let driver = FakeDriver::new();
    let db = db_with(driver);
    db.health_check().await.unwrap();
    assert_eq!(db.stats().idle, 1);
}

#[tokio::test]
async fn schema_qualifier_reaches_generated_sql() {
    let driver = FakeDriver::new();
    let db = Database::with_driver(
        Box::new(driver.clone()),
        DatabaseConfig::sqlite_in_memory().schema("app"),
    );

    db.query::<Item>().get().await.unwrap();
    assert_eq!(driver.issued_sql()[0], "SELECT * FROM app.item");
}
