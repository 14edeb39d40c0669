//! Query builder types

use std::fmt;

use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

use super::builder::QueryBuilder;

/// Comparison operators supported in predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
            QueryOperator::Between => write!(f, "BETWEEN"),
        }
    }
}

impl QueryOperator {
    /// Parse the operator spelling accepted by the generic `where_op` call.
    pub fn parse(op: &str) -> OrmResult<Self> {
        let operator = match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => QueryOperator::Equal,
            "!=" | "<>" => QueryOperator::NotEqual,
            ">" => QueryOperator::GreaterThan,
            ">=" => QueryOperator::GreaterThanOrEqual,
            "<" => QueryOperator::LessThan,
            "<=" => QueryOperator::LessThanOrEqual,
            "like" => QueryOperator::Like,
            "not like" => QueryOperator::NotLike,
            "in" => QueryOperator::In,
            "not in" => QueryOperator::NotIn,
            "is null" => QueryOperator::IsNull,
            "is not null" => QueryOperator::IsNotNull,
            "between" => QueryOperator::Between,
            other => return Err(OrmError::Query(format!("unknown operator '{}'", other))),
        };
        Ok(operator)
    }
}

/// How a predicate attaches to the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => write!(f, "AND"),
            Conjunction::Or => write!(f, "OR"),
        }
    }
}

/// A simple column/operator/value condition
#[derive(Debug, Clone)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<DbValue>,
    /// Value collection for IN / NOT IN / BETWEEN.
    pub values: Vec<DbValue>,
}

/// One entry in a WHERE or HAVING list
#[derive(Debug, Clone)]
pub struct WhereEntry {
    pub conjunction: Conjunction,
    pub predicate: Predicate,
}

/// A predicate: plain condition or a nested subquery
#[derive(Debug, Clone)]
pub enum Predicate {
    Condition(WhereCondition),
    InSubquery {
        column: String,
        negated: bool,
        query: Box<QueryBuilder>,
    },
    Exists {
        negated: bool,
        query: Box<QueryBuilder>,
    },
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
        }
    }
}

/// Join clause: table plus equi-join column pairs
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on_conditions: Vec<(String, String)>,
}

/// Ordering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderByClause {
    pub column: String,
    pub direction: OrderDirection,
}
