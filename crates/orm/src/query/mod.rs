//! Query building and SQL generation

pub mod builder;
pub mod sql;
pub mod types;

pub use builder::QueryBuilder;
pub use types::{
    Conjunction, JoinClause, JoinType, OrderByClause, OrderDirection, Predicate, QueryOperator,
    WhereCondition, WhereEntry,
};
