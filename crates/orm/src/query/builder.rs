//! Fluent query construction
//!
//! Each chained call appends to an internal specification without executing
//! anything; rendering happens once, in `to_sql_with_params`. Values never
//! reach the SQL text, every one becomes a positional bound parameter.

use crate::value::DbValue;

use super::types::*;

/// Accumulated query specification, immutable until rendered
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    pub(super) select_fields: Vec<String>,
    pub(super) distinct: bool,
    pub(super) from_table: Option<String>,
    pub(super) wheres: Vec<WhereEntry>,
    pub(super) joins: Vec<JoinClause>,
    pub(super) group_by: Vec<String>,
    pub(super) havings: Vec<WhereEntry>,
    pub(super) order_by: Vec<OrderByClause>,
    pub(super) limit_value: Option<i64>,
    pub(super) offset_value: Option<i64>,
    /// First construction error, surfaced when the query is rendered.
    pub(super) invalid: Option<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(table: &str) -> Self {
        Self {
            from_table: Some(table.to_string()),
            ..Self::default()
        }
    }

    pub fn from(mut self, table: &str) -> Self {
        self.from_table = Some(table.to_string());
        self
    }

    /// Replace the projection; `fields` is a comma-separated column list.
    pub fn select(mut self, fields: &str) -> Self {
        if fields == "*" {
            self.select_fields.push("*".to_string());
        } else {
            self.select_fields
                .extend(fields.split(',').map(|f| f.trim().to_string()));
        }
        self
    }

    /// Push a projection fragment verbatim, commas and all.
    pub fn select_raw(mut self, fragment: &str) -> Self {
        self.select_fields.push(fragment.to_string());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn push_where(mut self, conjunction: Conjunction, predicate: Predicate) -> Self {
        self.wheres.push(WhereEntry {
            conjunction,
            predicate,
        });
        self
    }

    fn condition(
        column: &str,
        operator: QueryOperator,
        value: Option<DbValue>,
        values: Vec<DbValue>,
    ) -> Predicate {
        Predicate::Condition(WhereCondition {
            column: column.to_string(),
            operator,
            value,
            values,
        })
    }

    /// Generic predicate with an operator spelled as text, e.g.
    /// `where_op("age", ">", 18)`. Unknown operators surface when the query
    /// is rendered.
    pub fn where_op<T: Into<DbValue>>(self, column: &str, operator: &str, value: T) -> Self {
        match QueryOperator::parse(operator) {
            Ok(op) => self.push_where(
                Conjunction::And,
                Self::condition(column, op, Some(value.into()), Vec::new()),
            ),
            Err(err) => self.poison(err.to_string()),
        }
    }

    pub fn or_where_op<T: Into<DbValue>>(self, column: &str, operator: &str, value: T) -> Self {
        match QueryOperator::parse(operator) {
            Ok(op) => self.push_where(
                Conjunction::Or,
                Self::condition(column, op, Some(value.into()), Vec::new()),
            ),
            Err(err) => self.poison(err.to_string()),
        }
    }

    fn poison(mut self, message: String) -> Self {
        if self.invalid.is_none() {
            self.invalid = Some(message);
        }
        self
    }

    pub fn where_eq<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::Equal, Some(value.into()), Vec::new()),
        )
    }

    pub fn or_where_eq<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::Or,
            Self::condition(column, QueryOperator::Equal, Some(value.into()), Vec::new()),
        )
    }

    pub fn where_ne<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::NotEqual, Some(value.into()), Vec::new()),
        )
    }

    pub fn where_gt<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::GreaterThan, Some(value.into()), Vec::new()),
        )
    }

    pub fn where_gte<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::GreaterThanOrEqual,
                Some(value.into()),
                Vec::new(),
            ),
        )
    }

    pub fn where_lt<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::LessThan, Some(value.into()), Vec::new()),
        )
    }

    pub fn where_lte<T: Into<DbValue>>(self, column: &str, value: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::LessThanOrEqual,
                Some(value.into()),
                Vec::new(),
            ),
        )
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::Like,
                Some(DbValue::String(pattern.to_string())),
                Vec::new(),
            ),
        )
    }

    pub fn where_in<T: Into<DbValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::In,
                None,
                values.into_iter().map(Into::into).collect(),
            ),
        )
    }

    pub fn where_not_in<T: Into<DbValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::NotIn,
                None,
                values.into_iter().map(Into::into).collect(),
            ),
        )
    }

    pub fn where_between<T: Into<DbValue>>(self, column: &str, low: T, high: T) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(
                column,
                QueryOperator::Between,
                None,
                vec![low.into(), high.into()],
            ),
        )
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::IsNull, None, Vec::new()),
        )
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_where(
            Conjunction::And,
            Self::condition(column, QueryOperator::IsNotNull, None, Vec::new()),
        )
    }

    /// `column IN (<subquery>)`; the subquery's parameters splice into the
    /// outer parameter list at this predicate's position.
    pub fn where_in_query(self, column: &str, query: QueryBuilder) -> Self {
        self.push_where(
            Conjunction::And,
            Predicate::InSubquery {
                column: column.to_string(),
                negated: false,
                query: Box::new(query),
            },
        )
    }

    pub fn where_not_in_query(self, column: &str, query: QueryBuilder) -> Self {
        self.push_where(
            Conjunction::And,
            Predicate::InSubquery {
                column: column.to_string(),
                negated: true,
                query: Box::new(query),
            },
        )
    }

    pub fn where_exists(self, query: QueryBuilder) -> Self {
        self.push_where(
            Conjunction::And,
            Predicate::Exists {
                negated: false,
                query: Box::new(query),
            },
        )
    }

    pub fn where_not_exists(self, query: QueryBuilder) -> Self {
        self.push_where(
            Conjunction::And,
            Predicate::Exists {
                negated: true,
                query: Box::new(query),
            },
        )
    }

    pub fn join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            table: table.to_string(),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    pub fn left_join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            table: table.to_string(),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    pub fn right_join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Right,
            table: table.to_string(),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn having<T: Into<DbValue>>(mut self, column: &str, operator: &str, value: T) -> Self {
        match QueryOperator::parse(operator) {
            Ok(op) => {
                self.havings.push(WhereEntry {
                    conjunction: Conjunction::And,
                    predicate: Self::condition(column, op, Some(value.into()), Vec::new()),
                });
                self
            }
            Err(err) => self.poison(err.to_string()),
        }
    }

    pub fn select_count(self, column: &str) -> Self {
        self.select_aggregate("COUNT", column)
    }

    pub fn select_sum(self, column: &str) -> Self {
        self.select_aggregate("SUM", column)
    }

    pub fn select_avg(self, column: &str) -> Self {
        self.select_aggregate("AVG", column)
    }

    pub fn select_min(self, column: &str) -> Self {
        self.select_aggregate("MIN", column)
    }

    pub fn select_max(self, column: &str) -> Self {
        self.select_aggregate("MAX", column)
    }

    fn select_aggregate(mut self, function: &str, column: &str) -> Self {
        self.select_fields.push(format!("{}({})", function, column));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderByClause {
            column: column.to_string(),
            direction: OrderDirection::Asc,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderByClause {
            column: column.to_string(),
            direction: OrderDirection::Desc,
        });
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit_value = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// LIMIT + OFFSET from a 1-based page number.
    pub fn paginate(mut self, per_page: i64, page: i64) -> Self {
        self.limit_value = Some(per_page);
        self.offset_value = Some((page.max(1) - 1) * per_page);
        self
    }

    pub fn has_wheres(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub(crate) fn and_condition(self, condition: WhereCondition) -> Self {
        self.push_where(Conjunction::And, Predicate::Condition(condition))
    }

    pub(crate) fn for_first(mut self) -> Self {
        self.limit_value = Some(1);
        self
    }

    /// The same filters rendered as `SELECT COUNT(*)`; ordering and paging
    /// are meaningless under an aggregate and are dropped.
    pub(crate) fn for_count(&self) -> Self {
        let mut query = self.clone();
        query.select_fields = vec!["COUNT(*) AS count".to_string()];
        query.distinct = false;
        query.order_by.clear();
        query.limit_value = None;
        query.offset_value = None;
        query
    }
}
