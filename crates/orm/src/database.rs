//! Database facade
//!
//! The entry point tying the layers together: a pool of driver connections,
//! per-type global scopes and observers, and typed CRUD built on the schema
//! templates. Scope and observer registries are snapshotted before any await,
//! so no lock is ever held across I/O.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::backend::{driver_for, Dialect, Driver, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::events::{ChangeSet, ModelObserver, ObserverManager, ObserverSet};
use crate::model::Model;
use crate::pool::{Pool, PooledConnection, PoolStats};
use crate::query::QueryBuilder;
use crate::relation::{group_rows_by_key, key_chunks, RelatedMap};
use crate::row::Row;
use crate::scope::{GlobalScope, ScopeRegistry};
use crate::transaction::Transaction;
use crate::value::DbValue;

/// Anything statements can run on: a pooled connection or an open transaction
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult>;

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>>;

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>>;
}

#[async_trait]
impl Executor for PooledConnection {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        PooledConnection::execute(self, sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        PooledConnection::fetch_all(self, sql, params).await
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        PooledConnection::fetch_optional(self, sql, params).await
    }
}

#[async_trait]
impl Executor for Transaction {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        Transaction::execute(self, sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        Transaction::fetch_all(self, sql, params).await
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        Transaction::fetch_optional(self, sql, params).await
    }
}

struct DatabaseInner {
    pool: Pool,
    config: DatabaseConfig,
    scopes: RwLock<ScopeRegistry>,
    observers: RwLock<ObserverManager>,
}

/// Shared handle to one configured database; cheap to clone
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Build a facade for the configured backend. Connections open lazily on
    /// first acquisition; use `health_check` to verify reachability up front.
    pub fn connect(config: DatabaseConfig) -> OrmResult<Self> {
        let driver = driver_for(config.backend);
        Ok(Self::with_driver(driver, config))
    }

    /// Build a facade over an explicit driver; the seam custom backends and
    /// tests plug into.
    pub fn with_driver(driver: Box<dyn Driver>, config: DatabaseConfig) -> Self {
        let pool = Pool::new(driver, config.clone());
        Self {
            inner: Arc::new(DatabaseInner {
                pool,
                config,
                scopes: RwLock::new(ScopeRegistry::new()),
                observers: RwLock::new(ObserverManager::new()),
            }),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.pool.dialect()
    }

    fn schema_name(&self) -> &str {
        &self.inner.config.schema
    }

    /// Borrow a connection and ping it.
    pub async fn health_check(&self) -> OrmResult<()> {
        let mut conn = self.inner.pool.acquire().await?;
        conn.ping().await
    }

    /// Shut the pool down; subsequent operations fail fast.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    /// Open a transaction on a dedicated connection.
    pub async fn begin(&self) -> OrmResult<Transaction> {
        Transaction::begin(&self.inner.pool).await
    }

    // --- registries ---

    pub fn register_scope<M: Model>(&self, scope: GlobalScope) {
        self.inner
            .scopes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register::<M>(scope);
    }

    pub fn remove_scope<M: Model>(&self, name: &str) {
        self.inner
            .scopes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove::<M>(name);
    }

    pub fn register_observer<M: Model>(&self, observer: Arc<dyn ModelObserver<M>>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register::<M>(observer);
    }

    fn scopes_for<M: Model>(&self) -> Vec<GlobalScope> {
        self.inner
            .scopes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .scopes_for::<M>()
    }

    fn observers_for<M: Model>(&self) -> ObserverSet<M> {
        self.inner
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .observers_for::<M>()
    }

    // --- typed queries ---

    /// Start a query against `M`'s table. Global scopes and the soft-delete
    /// filter apply when the query runs.
    pub fn query<M: Model>(&self) -> ModelQuery<'_, M> {
        ModelQuery {
            db: self,
            builder: QueryBuilder::table(&M::qualified_table(self.schema_name())),
            without_scopes: Vec::new(),
            skip_scopes: false,
            trashed: TrashedFilter::Exclude,
            _marker: PhantomData,
        }
    }

    /// Look up one record by primary key. Global scopes and the soft-delete
    /// filter apply.
    pub async fn find<M: Model>(&self, key: M::Key) -> OrmResult<Option<M>> {
        self.query::<M>()
            .where_eq(M::primary_key_name(), key)
            .first()
            .await
    }

    /// Like `find`, but an absent record is an error.
    pub async fn find_or_fail<M: Model>(&self, key: M::Key) -> OrmResult<M> {
        self.find(key)
            .await?
            .ok_or_else(|| OrmError::NotFound(M::table_name().to_string()))
    }

    /// Identity lookup on a specific executor, bypassing scopes and
    /// including soft-deleted rows. Runs on `exec` so a transaction's
    /// pre-reads stay on the transaction's own connection.
    async fn fetch_any_on<M: Model>(
        &self,
        exec: &mut dyn Executor,
        key: &DbValue,
    ) -> OrmResult<Option<M>> {
        let (sql, params) = QueryBuilder::table(&M::qualified_table(self.schema_name()))
            .where_eq(M::primary_key_name(), key.clone())
            .for_first()
            .to_sql_with_params()?;
        match exec.fetch_optional(&sql, &params).await? {
            Some(row) => Ok(Some(M::from_row(&row)?)),
            None => Ok(None),
        }
    }

    // --- CRUD ---

    /// Insert a new record, firing `creating`/`created` hooks and stamping
    /// timestamp columns. Returns the instance with its generated key set.
    pub async fn create<M: Model>(&self, model: M) -> OrmResult<M> {
        let mut conn = self.inner.pool.acquire().await?;
        self.create_on(&mut conn, model).await
    }

    /// `create` inside an open transaction.
    pub async fn create_in<M: Model>(&self, tx: &mut Transaction, model: M) -> OrmResult<M> {
        self.create_on(tx, model).await
    }

    async fn create_on<M: Model>(
        &self,
        exec: &mut dyn Executor,
        mut model: M,
    ) -> OrmResult<M> {
        // hooks run before any statement; a veto means zero SQL
        let observers = self.observers_for::<M>();
        observers.creating(&mut model).await?;

        if M::uses_timestamps() {
            // caller-supplied stamps win, e.g. when importing records
            let now = Utc::now();
            if model.create_time().is_none() {
                model.set_create_time(now);
            }
            if model.update_time().is_none() {
                model.set_update_time(now);
            }
        }

        let params = model.to_params();
        if self.dialect().supports_returning() {
            let sql = M::insert_sql(self.schema_name());
            let row = exec
                .fetch_optional(&sql, &params)
                .await?
                .ok_or_else(|| OrmError::Statement("insert returned no row".into()))?;
            let key: M::Key = row.column(M::primary_key_name())?;
            model.set_primary_key(key);
        } else {
            let sql = M::insert_sql_without_returning(self.schema_name());
            let result = exec.execute(&sql, &params).await?;
            if let Some(id) = result.last_insert_id {
                use crate::row::FromDbValue;
                model.set_primary_key(M::Key::from_db(&DbValue::Int64(id))?);
            }
        }
        debug!(table = M::table_name(), "record created");

        observers.created(&model).await?;
        Ok(model)
    }

    /// Write every non-key field of a persisted instance back, firing
    /// `updating`/`updated` hooks and bumping `update_time`.
    pub async fn update<M: Model>(&self, model: M) -> OrmResult<M> {
        let mut conn = self.inner.pool.acquire().await?;
        self.update_on(&mut conn, model).await
    }

    /// `update` inside an open transaction.
    pub async fn update_in<M: Model>(&self, tx: &mut Transaction, model: M) -> OrmResult<M> {
        self.update_on(tx, model).await
    }

    async fn update_on<M: Model>(
        &self,
        exec: &mut dyn Executor,
        mut model: M,
    ) -> OrmResult<M> {
        let key = model
            .primary_key_value()
            .ok_or(OrmError::MissingPrimaryKey)?;

        let observers = self.observers_for::<M>();
        let mut changes = ChangeSet::from_model(&model);
        observers.updating(&mut model, &mut changes).await?;

        if M::uses_timestamps() {
            model.set_update_time(Utc::now());
        }

        let mut params = model.to_params();
        params.push(key);
        let sql = M::update_sql(self.schema_name());
        let result = exec.execute(&sql, &params).await?;
        if result.rows_affected == 0 {
            return Err(OrmError::NotFound(M::table_name().to_string()));
        }
        debug!(table = M::table_name(), "record updated");

        // the instance was authoritative; report what actually went out
        observers.updated(&model, &ChangeSet::from_model(&model)).await?;
        Ok(model)
    }

    /// Partial update: write only the listed columns of a persisted
    /// instance. `updating`/`updated` hooks fire with the change set as
    /// their payload, and an `updating` hook may amend it before anything
    /// is written. Bumps `update_time` on timestamped models unless the
    /// change set already carries one.
    pub async fn update_fields<M: Model>(
        &self,
        model: M,
        fields: &[(&str, DbValue)],
    ) -> OrmResult<M> {
        let mut conn = self.inner.pool.acquire().await?;
        self.update_fields_on(&mut conn, model, fields).await
    }

    /// `update_fields` inside an open transaction.
    pub async fn update_fields_in<M: Model>(
        &self,
        tx: &mut Transaction,
        model: M,
        fields: &[(&str, DbValue)],
    ) -> OrmResult<M> {
        self.update_fields_on(tx, model, fields).await
    }

    async fn update_fields_on<M: Model>(
        &self,
        exec: &mut dyn Executor,
        mut model: M,
        fields: &[(&str, DbValue)],
    ) -> OrmResult<M> {
        let key = model
            .primary_key_value()
            .ok_or(OrmError::MissingPrimaryKey)?;

        let observers = self.observers_for::<M>();
        let mut changes = ChangeSet::from_pairs(fields);
        observers.updating(&mut model, &mut changes).await?;
        if changes.is_empty() {
            return Ok(model);
        }

        if M::uses_timestamps() && !changes.contains("update_time") {
            let now = Utc::now();
            model.set_update_time(now);
            changes.set("update_time", now);
        }

        let assignments: Vec<(&str, DbValue)> =
            changes.iter().map(|(c, v)| (c, v.clone())).collect();
        let (sql, params) = QueryBuilder::table(&M::qualified_table(self.schema_name()))
            .where_eq(M::primary_key_name(), key)
            .to_update_sql(&assignments)?;
        let result = exec.execute(&sql, &params).await?;
        if result.rows_affected == 0 {
            return Err(OrmError::NotFound(M::table_name().to_string()));
        }
        debug!(table = M::table_name(), columns = changes.len(), "record partially updated");

        observers.updated(&model, &changes).await?;
        Ok(model)
    }

    /// Insert or update depending on whether the instance has a key.
    pub async fn save<M: Model>(&self, model: M) -> OrmResult<M> {
        if model.primary_key().is_none() {
            self.create(model).await
        } else {
            self.update(model).await
        }
    }

    /// `save` inside an open transaction.
    pub async fn save_in<M: Model>(&self, tx: &mut Transaction, model: M) -> OrmResult<M> {
        if model.primary_key().is_none() {
            self.create_in(tx, model).await
        } else {
            self.update_in(tx, model).await
        }
    }

    /// Delete by primary key, honoring the model's soft-delete policy.
    /// Soft-deleting an already soft-deleted record is a no-op.
    pub async fn delete<M: Model>(&self, key: M::Key) -> OrmResult<()> {
        let mut conn = self.inner.pool.acquire().await?;
        self.delete_on::<M>(&mut conn, key, M::uses_soft_deletes())
            .await
    }

    /// `delete` inside an open transaction.
    pub async fn delete_in<M: Model>(&self, tx: &mut Transaction, key: M::Key) -> OrmResult<()> {
        self.delete_on::<M>(tx, key, M::uses_soft_deletes()).await
    }

    /// Remove the row outright, even for soft-deleting models.
    pub async fn force_delete<M: Model>(&self, key: M::Key) -> OrmResult<()> {
        let mut conn = self.inner.pool.acquire().await?;
        self.delete_on::<M>(&mut conn, key, false).await
    }

    async fn delete_on<M: Model>(
        &self,
        exec: &mut dyn Executor,
        key: M::Key,
        soft: bool,
    ) -> OrmResult<()> {
        let key_value: DbValue = key.into();
        let model: M = self
            .fetch_any_on(exec, &key_value)
            .await?
            .ok_or_else(|| OrmError::NotFound(M::table_name().to_string()))?;

        if soft && model.is_soft_deleted() {
            return Ok(());
        }

        let observers = self.observers_for::<M>();
        observers.deleting(&model).await?;

        if soft {
            let sql = format!(
                "UPDATE {} SET {} = $1 WHERE {} = $2",
                M::qualified_table(self.schema_name()),
                M::delete_time_column(),
                M::primary_key_name()
            );
            exec.execute(&sql, &[DbValue::DateTime(Utc::now()), key_value])
                .await?;
        } else {
            let sql = M::delete_sql(self.schema_name());
            exec.execute(&sql, &[key_value]).await?;
        }
        debug!(table = M::table_name(), soft, "record deleted");

        observers.deleted(&model).await?;
        Ok(())
    }

    /// Clear the soft-delete marker on a record.
    pub async fn restore<M: Model>(&self, key: M::Key) -> OrmResult<()> {
        if !M::uses_soft_deletes() {
            return Err(OrmError::Query(format!(
                "{} does not soft-delete",
                M::table_name()
            )));
        }
        let sql = format!(
            "UPDATE {} SET {} = NULL WHERE {} = $1",
            M::qualified_table(self.schema_name()),
            M::delete_time_column(),
            M::primary_key_name()
        );
        let mut conn = self.inner.pool.acquire().await?;
        let result = conn.execute(&sql, &[key.into()]).await?;
        if result.rows_affected == 0 {
            return Err(OrmError::NotFound(M::table_name().to_string()));
        }
        Ok(())
    }

    // --- relations ---

    /// Children of one parent: `SELECT … WHERE <foreign_key> = <key>`. One
    /// query per call; batch with `load_children` over a whole result set.
    pub async fn children_of<P: Model, C: Model>(
        &self,
        parent: &P,
        foreign_key: &str,
    ) -> OrmResult<Vec<C>> {
        let key = parent
            .primary_key_value()
            .ok_or(OrmError::MissingPrimaryKey)?;
        self.query::<C>().where_eq(foreign_key, key).get().await
    }

    /// The parent a child's foreign key points at.
    pub async fn parent_of<P: Model>(&self, foreign_key_value: DbValue) -> OrmResult<Option<P>> {
        if matches!(foreign_key_value, DbValue::Null) {
            return Ok(None);
        }
        self.query::<P>()
            .where_eq(P::primary_key_name(), foreign_key_value)
            .first()
            .await
    }

    /// Batched eager load: fetch every `C` whose `foreign_key` matches a
    /// parent's primary key, in chunked `IN` queries, bucketed by parent.
    pub async fn load_children<P: Model, C: Model>(
        &self,
        parents: &[P],
        foreign_key: &str,
    ) -> OrmResult<RelatedMap<C>> {
        let keys: Vec<DbValue> = parents
            .iter()
            .filter_map(|p| p.primary_key_value())
            .collect();

        let mut buckets: HashMap<String, Vec<C>> = HashMap::new();
        for chunk in key_chunks(keys) {
            let rows = self
                .query::<C>()
                .where_in(foreign_key, chunk)
                .fetch_rows()
                .await?;
            group_rows_by_key(rows, foreign_key, &mut buckets)?;
        }
        Ok(RelatedMap::new(buckets))
    }
}

/// Soft-delete visibility of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrashedFilter {
    Exclude,
    Include,
    Only,
}

/// One paged slice of a result set plus the unpaged total
#[derive(Debug, Clone)]
pub struct Page<M> {
    pub items: Vec<M>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// A query bound to a model type and a database handle
pub struct ModelQuery<'a, M: Model> {
    db: &'a Database,
    builder: QueryBuilder,
    without_scopes: Vec<String>,
    skip_scopes: bool,
    trashed: TrashedFilter,
    _marker: PhantomData<M>,
}

impl<'a, M: Model> ModelQuery<'a, M> {
    fn map(mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    pub fn select(self, fields: &str) -> Self {
        self.map(|b| b.select(fields))
    }

    pub fn where_op<T: Into<DbValue>>(self, column: &str, operator: &str, value: T) -> Self {
        self.map(|b| b.where_op(column, operator, value))
    }

    pub fn where_eq<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_eq(column, value))
    }

    pub fn or_where_eq<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.or_where_eq(column, value))
    }

    pub fn where_ne<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_ne(column, value))
    }

    pub fn where_gt<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_gt(column, value))
    }

    pub fn where_gte<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_gte(column, value))
    }

    pub fn where_lt<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_lt(column, value))
    }

    pub fn where_lte<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.map(|b| b.where_lte(column, value))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.map(|b| b.where_like(column, pattern))
    }

    pub fn where_in<T: Into<DbValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.map(|b| b.where_in(column, values))
    }

    pub fn where_not_in<T: Into<DbValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.map(|b| b.where_not_in(column, values))
    }

    pub fn where_between<T: Into<DbValue>>(self, column: &str, low: T, high: T) -> Self {
        self.map(|b| b.where_between(column, low, high))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.map(|b| b.where_null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.map(|b| b.where_not_null(column))
    }

    pub fn order_by(self, column: &str) -> Self {
        self.map(|b| b.order_by(column))
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.map(|b| b.order_by_desc(column))
    }

    pub fn limit(self, count: i64) -> Self {
        self.map(|b| b.limit(count))
    }

    pub fn offset(self, count: i64) -> Self {
        self.map(|b| b.offset(count))
    }

    /// Opt out of one named global scope for this query.
    pub fn without_scope(mut self, name: &str) -> Self {
        self.without_scopes.push(name.to_string());
        self
    }

    /// Opt out of every global scope for this query.
    pub fn without_global_scopes(mut self) -> Self {
        self.skip_scopes = true;
        self
    }

    /// Include soft-deleted records.
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedFilter::Include;
        self
    }

    /// Only soft-deleted records.
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedFilter::Only;
        self
    }

    /// Apply scopes and the soft-delete filter; the result is what renders.
    fn finalize(&self) -> QueryBuilder {
        let mut builder = self.builder.clone();
        if !self.skip_scopes {
            for scope in self.db.scopes_for::<M>() {
                if !self.without_scopes.contains(&scope.name) {
                    builder = builder.and_condition(scope.condition);
                }
            }
        }
        if M::uses_soft_deletes() {
            builder = match self.trashed {
                TrashedFilter::Exclude => builder.where_null(M::delete_time_column()),
                TrashedFilter::Only => builder.where_not_null(M::delete_time_column()),
                TrashedFilter::Include => builder,
            };
        }
        builder
    }

    async fn fetch_rows(&self) -> OrmResult<Vec<Row>> {
        let (sql, params) = self.finalize().to_sql_with_params()?;
        let mut conn = self.db.inner.pool.acquire().await?;
        conn.fetch_all(&sql, &params).await
    }

    /// Run the query and materialize every row.
    pub async fn get(&self) -> OrmResult<Vec<M>> {
        self.fetch_rows()
            .await?
            .iter()
            .map(M::from_row)
            .collect()
    }

    /// Run the query with `LIMIT 1` and materialize the first row, if any.
    pub async fn first(&self) -> OrmResult<Option<M>> {
        let (sql, params) = self.finalize().for_first().to_sql_with_params()?;
        let mut conn = self.db.inner.pool.acquire().await?;
        match conn.fetch_optional(&sql, &params).await? {
            Some(row) => Ok(Some(M::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Like `first`, but an empty result is an error.
    pub async fn first_or_fail(&self) -> OrmResult<M> {
        self.first()
            .await?
            .ok_or_else(|| OrmError::NotFound(M::table_name().to_string()))
    }

    /// `SELECT COUNT(*)` over the same filters.
    pub async fn count(&self) -> OrmResult<i64> {
        let (sql, params) = self.finalize().for_count().to_sql_with_params()?;
        let mut conn = self.db.inner.pool.acquire().await?;
        let row = conn
            .fetch_optional(&sql, &params)
            .await?
            .ok_or_else(|| OrmError::Statement("count returned no row".into()))?;
        row.column("count")
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// One page of results plus the unpaged total.
    pub async fn paginate(&self, per_page: i64, page: i64) -> OrmResult<Page<M>> {
        let total = self.count().await?;
        let (sql, params) = self
            .finalize()
            .paginate(per_page, page)
            .to_sql_with_params()?;
        let mut conn = self.db.inner.pool.acquire().await?;
        let items = conn
            .fetch_all(&sql, &params)
            .await?
            .iter()
            .map(M::from_row)
            .collect::<OrmResult<Vec<M>>>()?;
        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Bulk update of every matching row. Bypasses per-instance hooks but
    /// still bumps `update_time` on timestamped models.
    pub async fn update(&self, assignments: &[(&str, DbValue)]) -> OrmResult<u64> {
        let mut assignments = assignments.to_vec();
        if M::uses_timestamps() {
            assignments.push(("update_time", DbValue::DateTime(Utc::now())));
        }
        let (sql, params) = self.finalize().to_update_sql(&assignments)?;
        let mut conn = self.db.inner.pool.acquire().await?;
        Ok(conn.execute(&sql, &params).await?.rows_affected)
    }

    /// Bulk delete of every matching row, honoring the soft-delete policy.
    /// Bypasses per-instance hooks.
    pub async fn delete(&self) -> OrmResult<u64> {
        let builder = self.finalize();
        let (sql, params) = if M::uses_soft_deletes() && self.trashed == TrashedFilter::Exclude {
            builder.to_update_sql(&[(
                M::delete_time_column(),
                DbValue::DateTime(Utc::now()),
            )])?
        } else {
            builder.to_delete_sql()?
        };
        let mut conn = self.db.inner.pool.acquire().await?;
        Ok(conn.execute(&sql, &params).await?.rows_affected)
    }
}
