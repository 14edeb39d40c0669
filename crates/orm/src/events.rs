//! Model lifecycle observers
//!
//! Observers hook into create, update, and delete flows. Pre-hooks run
//! before the statement is issued and may mutate the model or veto the
//! operation by returning an error; a veto aborts before any SQL reaches the
//! database. Post-hooks run after the statement succeeds. Hooks fire in
//! registration order and the first error stops the chain.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::OrmResult;
use crate::model::Model;
use crate::value::DbValue;

/// The columns an update is about to write, in write order
///
/// Update hooks receive this as their payload. In partial updates the set is
/// authoritative: edits made by an `updating` hook change what is written.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: Vec<(String, DbValue)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, DbValue)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect(),
        }
    }

    /// Every non-key column of an instance, in schema order.
    pub fn from_model<M: Model>(model: &M) -> Self {
        Self {
            entries: M::field_names()
                .iter()
                .map(|name| name.to_string())
                .zip(model.to_params())
                .collect(),
        }
    }

    /// Set or replace one column's pending value.
    pub fn set<T: Into<DbValue>>(&mut self, column: &str, value: T) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| c == column) {
            entry.1 = value;
        } else {
            self.entries.push((column.to_string(), value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, column: &str) {
        self.entries.retain(|(c, _)| c != column);
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }
}

/// Lifecycle hooks for one model type; every hook defaults to a no-op
#[async_trait]
pub trait ModelObserver<M: Model>: Send + Sync {
    async fn creating(&self, _model: &mut M) -> OrmResult<()> {
        Ok(())
    }

    async fn created(&self, _model: &M) -> OrmResult<()> {
        Ok(())
    }

    /// `changes` lists the columns the update is about to write. In partial
    /// updates, edits to it alter the written set; in full-instance updates
    /// the instance itself is authoritative.
    async fn updating(&self, _model: &mut M, _changes: &mut ChangeSet) -> OrmResult<()> {
        Ok(())
    }

    async fn updated(&self, _model: &M, _changes: &ChangeSet) -> OrmResult<()> {
        Ok(())
    }

    async fn deleting(&self, _model: &M) -> OrmResult<()> {
        Ok(())
    }

    async fn deleted(&self, _model: &M) -> OrmResult<()> {
        Ok(())
    }
}

/// A snapshot of the observers registered for one model type
pub struct ObserverSet<M: Model> {
    observers: Vec<Arc<dyn ModelObserver<M>>>,
}

impl<M: Model> ObserverSet<M> {
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub async fn creating(&self, model: &mut M) -> OrmResult<()> {
        for observer in &self.observers {
            observer.creating(model).await?;
        }
        Ok(())
    }

    pub async fn created(&self, model: &M) -> OrmResult<()> {
        for observer in &self.observers {
            observer.created(model).await?;
        }
        Ok(())
    }

    pub async fn updating(&self, model: &mut M, changes: &mut ChangeSet) -> OrmResult<()> {
        for observer in &self.observers {
            observer.updating(model, changes).await?;
        }
        Ok(())
    }

    pub async fn updated(&self, model: &M, changes: &ChangeSet) -> OrmResult<()> {
        for observer in &self.observers {
            observer.updated(model, changes).await?;
        }
        Ok(())
    }

    pub async fn deleting(&self, model: &M) -> OrmResult<()> {
        for observer in &self.observers {
            observer.deleting(model).await?;
        }
        Ok(())
    }

    pub async fn deleted(&self, model: &M) -> OrmResult<()> {
        for observer in &self.observers {
            observer.deleted(model).await?;
        }
        Ok(())
    }
}

/// Observers for all model types, keyed by type
///
/// Lookup returns a cloned snapshot so no lock is held while hooks await.
#[derive(Default)]
pub struct ObserverManager {
    observers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Model + 'static>(&mut self, observer: Arc<dyn ModelObserver<M>>) {
        let entry = self
            .observers
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn ModelObserver<M>>>::new()));
        let list = entry
            .downcast_mut::<Vec<Arc<dyn ModelObserver<M>>>>()
            .expect("observer list stored under a different model type");
        list.push(observer);
        debug!(table = M::table_name(), count = list.len(), "observer registered");
    }

    pub fn observers_for<M: Model + 'static>(&self) -> ObserverSet<M> {
        let observers = self
            .observers
            .get(&TypeId::of::<M>())
            .and_then(|boxed| boxed.downcast_ref::<Vec<Arc<dyn ModelObserver<M>>>>())
            .cloned()
            .unwrap_or_default();
        ObserverSet { observers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrmError;
    use crate::model;
    use std::sync::atomic::{AtomicUsize, Ordering};

    model! {
        struct Widget {
            pk id: i64,
            name: String,
        }
    }

    struct Uppercaser;

    #[async_trait]
    impl ModelObserver<Widget> for Uppercaser {
        async fn creating(&self, model: &mut Widget) -> OrmResult<()> {
            model.name = model.name.to_uppercase();
            Ok(())
        }
    }

    struct Rejecter;

    #[async_trait]
    impl ModelObserver<Widget> for Rejecter {
        async fn creating(&self, _model: &mut Widget) -> OrmResult<()> {
            Err(OrmError::Validation("nope".into()))
        }
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl ModelObserver<Widget> for Counter {
        async fn creating(&self, _model: &mut Widget) -> OrmResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn widget() -> Widget {
        Widget {
            id: None,
            name: "gear".into(),
        }
    }

    #[tokio::test]
    async fn hooks_may_mutate() {
        let mut manager = ObserverManager::new();
        manager.register::<Widget>(Arc::new(Uppercaser));

        let mut model = widget();
        manager
            .observers_for::<Widget>()
            .creating(&mut model)
            .await
            .unwrap();
        assert_eq!(model.name, "GEAR");
    }

    #[tokio::test]
    async fn first_error_stops_the_chain() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut manager = ObserverManager::new();
        manager.register::<Widget>(Arc::new(Rejecter));
        manager.register::<Widget>(Arc::new(Counter(count.clone())));

        let mut model = widget();
        let err = manager
            .observers_for::<Widget>()
            .creating(&mut model)
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistered_type_has_no_observers() {
        let manager = ObserverManager::new();
        assert!(manager.observers_for::<Widget>().is_empty());
    }

    #[test]
    fn changeset_set_replaces_in_place() {
        let mut changes = ChangeSet::from_pairs(&[("name", DbValue::String("a".into()))]);
        changes.set("name", "b");
        changes.set("extra", 1i64);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.get("name"), Some(&DbValue::String("b".into())));
        assert!(changes.contains("extra"));
    }

    #[test]
    fn changeset_from_model_follows_schema_order() {
        let changes = ChangeSet::from_model(&widget());
        let columns: Vec<&str> = changes.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["name"]);
    }
}
