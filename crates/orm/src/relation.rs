//! Relation containers and eager-load grouping
//!
//! A relation field starts unloaded; reading it before a load is an explicit
//! `None`, never an implicit query. Loading happens through the facade,
//! either per instance (one query per parent) or batched for a whole result
//! set (one `IN` query per chunk of parent keys).

use std::collections::HashMap;

use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::row::Row;
use crate::value::DbValue;

/// Parent keys per batched eager-load query.
pub(crate) const EAGER_CHUNK_SIZE: usize = 500;

/// One-to-many relation: children carry this model's key in `foreign_key`
#[derive(Debug, Clone)]
pub struct HasMany<C: Model> {
    foreign_key: String,
    loaded: Option<Vec<C>>,
}

impl<C: Model> HasMany<C> {
    pub fn new(foreign_key: &str) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            loaded: None,
        }
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Loaded children, or `None` if no load has run yet.
    pub fn get(&self) -> Option<&[C]> {
        self.loaded.as_deref()
    }

    pub fn set_loaded(&mut self, children: Vec<C>) {
        self.loaded = Some(children);
    }

    /// Loaded children, or an error when unloaded.
    pub fn require(&self) -> OrmResult<&[C]> {
        self.get()
            .ok_or_else(|| OrmError::Query(format!("relation on {} not loaded", C::table_name())))
    }
}

/// Many-to-one relation: this model carries the parent's key in `foreign_key`
#[derive(Debug, Clone)]
pub struct BelongsTo<P: Model> {
    foreign_key: String,
    loaded: Option<Option<P>>,
}

impl<P: Model> BelongsTo<P> {
    pub fn new(foreign_key: &str) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            loaded: None,
        }
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The loaded parent. Outer `None` means unloaded, inner `None` means
    /// the key matched no row.
    pub fn get(&self) -> Option<Option<&P>> {
        self.loaded.as_ref().map(|p| p.as_ref())
    }

    pub fn set_loaded(&mut self, parent: Option<P>) {
        self.loaded = Some(parent);
    }
}

/// Children of a batched eager load, bucketed by parent key
#[derive(Debug)]
pub struct RelatedMap<C: Model> {
    buckets: HashMap<String, Vec<C>>,
}

impl<C: Model> RelatedMap<C> {
    pub(crate) fn new(buckets: HashMap<String, Vec<C>>) -> Self {
        Self { buckets }
    }

    /// Remove and return the children belonging to `key`; absent keys yield
    /// an empty list so every parent ends up loaded.
    pub fn take<K: Into<DbValue>>(&mut self, key: K) -> Vec<C> {
        self.buckets
            .remove(&key.into().group_key())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Split keys for chunked `IN` queries, duplicates removed.
pub(crate) fn key_chunks(keys: Vec<DbValue>) -> Vec<Vec<DbValue>> {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<DbValue> = keys
        .into_iter()
        .filter(|k| !matches!(k, DbValue::Null))
        .filter(|k| seen.insert(k.group_key()))
        .collect();
    unique
        .chunks(EAGER_CHUNK_SIZE)
        .map(|c| c.to_vec())
        .collect()
}

/// Decode fetched child rows and bucket them by the foreign key column.
pub(crate) fn group_rows_by_key<C: Model>(
    rows: Vec<Row>,
    foreign_key: &str,
    buckets: &mut HashMap<String, Vec<C>>,
) -> OrmResult<()> {
    for row in rows {
        let key = row.get(foreign_key)?.group_key();
        let child = C::from_row(&row)?;
        buckets.entry(key).or_default().push(child);
    }
    Ok(())
}
