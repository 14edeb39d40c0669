//! Global query scopes
//!
//! A global scope is a named predicate applied to every query the facade
//! builds for a model type. Registration is per model type; a query can opt
//! out of a single scope by name.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::model::Model;
use crate::query::WhereCondition;

/// A named predicate attached to every query for one model type
#[derive(Debug, Clone)]
pub struct GlobalScope {
    pub name: String,
    pub condition: WhereCondition,
}

impl GlobalScope {
    pub fn new(name: &str, condition: WhereCondition) -> Self {
        Self {
            name: name.to_string(),
            condition,
        }
    }
}

/// Scopes keyed by model type
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: HashMap<TypeId, Vec<GlobalScope>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope for `M`. Registering a name twice replaces the
    /// earlier scope.
    pub fn register<M: Model + 'static>(&mut self, scope: GlobalScope) {
        let entry = self.scopes.entry(TypeId::of::<M>()).or_default();
        if let Some(existing) = entry.iter_mut().find(|s| s.name == scope.name) {
            debug!(scope = %scope.name, table = M::table_name(), "global scope replaced");
            *existing = scope;
        } else {
            debug!(scope = %scope.name, table = M::table_name(), "global scope registered");
            entry.push(scope);
        }
    }

    pub fn remove<M: Model + 'static>(&mut self, name: &str) {
        if let Some(entry) = self.scopes.get_mut(&TypeId::of::<M>()) {
            entry.retain(|s| s.name != name);
        }
    }

    /// Scopes for `M`, in registration order.
    pub fn scopes_for<M: Model + 'static>(&self) -> Vec<GlobalScope> {
        self.scopes
            .get(&TypeId::of::<M>())
            .cloned()
            .unwrap_or_default()
    }
}
