//! SQL rendering
//!
//! Placeholders are numbered at render time with one counter shared across
//! the outer query and every subquery, so parameters line up with their
//! textual position no matter how deeply a predicate nests. Drivers that
//! speak `?` rewrite the numbered form before binding.

use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

use super::builder::QueryBuilder;
use super::types::{Predicate, QueryOperator, WhereEntry};

impl QueryBuilder {
    /// Render the query to SQL plus its bound parameters, in placeholder
    /// order.
    pub fn to_sql_with_params(&self) -> OrmResult<(String, Vec<DbValue>)> {
        self.check_valid()?;
        let table = self.require_table()?;

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&join.table);
            sql.push_str(" ON ");
            let ons: Vec<String> = join
                .on_conditions
                .iter()
                .map(|(l, r)| format!("{} = {}", l, r))
                .collect();
            sql.push_str(&ons.join(" AND "));
        }

        let mut params = Vec::new();
        let mut counter = 0usize;

        render_entries(&self.wheres, " WHERE ", &mut sql, &mut params, &mut counter)?;

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        render_entries(&self.havings, " HAVING ", &mut sql, &mut params, &mut counter)?;

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let orders: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction))
                .collect();
            sql.push_str(&orders.join(", "));
        }

        if let Some(limit) = self.limit_value {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset_value {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, params))
    }

    /// Render this builder's predicates as an UPDATE against its table.
    /// Assignment placeholders come first, then the WHERE parameters.
    pub fn to_update_sql(&self, assignments: &[(&str, DbValue)]) -> OrmResult<(String, Vec<DbValue>)> {
        self.check_valid()?;
        let table = self.require_table()?;
        if assignments.is_empty() {
            return Err(OrmError::Query("update with no assignments".into()));
        }

        let mut sql = format!("UPDATE {} SET ", table);
        let mut params = Vec::new();
        let mut counter = 0usize;

        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, value)| {
                counter += 1;
                params.push(value.clone());
                format!("{} = ${}", column, counter)
            })
            .collect();
        sql.push_str(&sets.join(", "));

        render_entries(&self.wheres, " WHERE ", &mut sql, &mut params, &mut counter)?;
        Ok((sql, params))
    }

    /// Render this builder's predicates as a DELETE against its table.
    pub fn to_delete_sql(&self) -> OrmResult<(String, Vec<DbValue>)> {
        self.check_valid()?;
        let table = self.require_table()?;

        let mut sql = format!("DELETE FROM {}", table);
        let mut params = Vec::new();
        let mut counter = 0usize;
        render_entries(&self.wheres, " WHERE ", &mut sql, &mut params, &mut counter)?;
        Ok((sql, params))
    }

    fn check_valid(&self) -> OrmResult<()> {
        match &self.invalid {
            Some(message) => Err(OrmError::Query(message.clone())),
            None => Ok(()),
        }
    }

    fn require_table(&self) -> OrmResult<&str> {
        self.from_table
            .as_deref()
            .ok_or_else(|| OrmError::Query("no table specified".into()))
    }

    /// Render as a subquery fragment, continuing the caller's placeholder
    /// numbering.
    fn render_subquery(
        &self,
        sql: &mut String,
        params: &mut Vec<DbValue>,
        counter: &mut usize,
    ) -> OrmResult<()> {
        self.check_valid()?;
        let table = self.require_table()?;

        sql.push_str("SELECT ");
        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(table);
        render_entries(&self.wheres, " WHERE ", sql, params, counter)?;
        Ok(())
    }
}

fn render_entries(
    entries: &[WhereEntry],
    keyword: &str,
    sql: &mut String,
    params: &mut Vec<DbValue>,
    counter: &mut usize,
) -> OrmResult<()> {
    for (i, entry) in entries.iter().enumerate() {
        if i == 0 {
            sql.push_str(keyword);
        } else {
            sql.push(' ');
            sql.push_str(&entry.conjunction.to_string());
            sql.push(' ');
        }
        render_predicate(&entry.predicate, sql, params, counter)?;
    }
    Ok(())
}

fn render_predicate(
    predicate: &Predicate,
    sql: &mut String,
    params: &mut Vec<DbValue>,
    counter: &mut usize,
) -> OrmResult<()> {
    match predicate {
        Predicate::Condition(cond) => match cond.operator {
            QueryOperator::IsNull | QueryOperator::IsNotNull => {
                sql.push_str(&format!("{} {}", cond.column, cond.operator));
            }
            QueryOperator::In | QueryOperator::NotIn => {
                if cond.values.is_empty() {
                    // IN () is invalid SQL; an empty list matches nothing
                    // (or everything, for NOT IN).
                    let always = if cond.operator == QueryOperator::In {
                        "1 = 0"
                    } else {
                        "1 = 1"
                    };
                    sql.push_str(always);
                } else {
                    let placeholders: Vec<String> = cond
                        .values
                        .iter()
                        .map(|value| {
                            *counter += 1;
                            params.push(value.clone());
                            format!("${}", counter)
                        })
                        .collect();
                    sql.push_str(&format!(
                        "{} {} ({})",
                        cond.column,
                        cond.operator,
                        placeholders.join(", ")
                    ));
                }
            }
            QueryOperator::Between => {
                if cond.values.len() != 2 {
                    return Err(OrmError::Query(format!(
                        "BETWEEN on {} requires exactly two bounds",
                        cond.column
                    )));
                }
                *counter += 1;
                params.push(cond.values[0].clone());
                let low = *counter;
                *counter += 1;
                params.push(cond.values[1].clone());
                sql.push_str(&format!(
                    "{} BETWEEN ${} AND ${}",
                    cond.column, low, counter
                ));
            }
            _ => {
                let value = cond.value.clone().ok_or_else(|| {
                    OrmError::Query(format!("operator {} requires a value", cond.operator))
                })?;
                *counter += 1;
                params.push(value);
                sql.push_str(&format!("{} {} ${}", cond.column, cond.operator, counter));
            }
        },
        Predicate::InSubquery {
            column,
            negated,
            query,
        } => {
            let keyword = if *negated { "NOT IN" } else { "IN" };
            sql.push_str(&format!("{} {} (", column, keyword));
            query.render_subquery(sql, params, counter)?;
            sql.push(')');
        }
        Predicate::Exists { negated, query } => {
            let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
            sql.push_str(keyword);
            sql.push_str(" (");
            query.render_subquery(sql, params, counter)?;
            sql.push(')');
        }
    }
    Ok(())
}
