//! Schema reflection
//!
//! Column metadata and canonical SQL templates derived from a model's
//! structural definition. The `model!` macro (see `model.rs`) implements this
//! trait at compile time; all four templates are computed from the same
//! ordered field list, so placeholder order and parameter order can never
//! drift apart.

use crate::value::DbValue;

/// Compile-time-derived column and table metadata for one model type
pub trait Schema {
    /// Lower-cased simple type name unless overridden.
    fn table_name() -> &'static str;

    /// Primary key column name.
    fn primary_key_name() -> &'static str;

    /// Ordered column names, excluding the primary key.
    fn field_names() -> &'static [&'static str];

    /// Number of columns participating in insert/update templates.
    fn field_count() -> usize {
        Self::field_names().len()
    }

    /// Non-key field values in `field_names()` order; used directly as the
    /// bound parameter list for insert and update.
    fn to_params(&self) -> Vec<DbValue>;

    /// Table name with an optional schema qualifier.
    fn qualified_table(schema: &str) -> String {
        if schema.is_empty() {
            Self::table_name().to_string()
        } else {
            format!("{}.{}", schema, Self::table_name())
        }
    }

    /// `INSERT INTO <table> (<cols>) VALUES ($1, …, $n) RETURNING <pk>`
    fn insert_sql(schema: &str) -> String {
        let placeholders: Vec<String> =
            (1..=Self::field_count()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            Self::qualified_table(schema),
            Self::field_names().join(", "),
            placeholders.join(", "),
            Self::primary_key_name()
        )
    }

    /// Insert template for backends that report the generated identity out of
    /// band instead of supporting a RETURNING clause.
    fn insert_sql_without_returning(schema: &str) -> String {
        let placeholders: Vec<String> =
            (1..=Self::field_count()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::qualified_table(schema),
            Self::field_names().join(", "),
            placeholders.join(", ")
        )
    }

    /// `UPDATE <table> SET <col> = $1, … WHERE <pk> = $(n+1)`
    fn update_sql(schema: &str) -> String {
        let assignments: Vec<String> = Self::field_names()
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} = ${}", name, i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            Self::qualified_table(schema),
            assignments.join(", "),
            Self::primary_key_name(),
            Self::field_count() + 1
        )
    }

    /// `SELECT * FROM <table>`
    fn select_sql(schema: &str) -> String {
        format!("SELECT * FROM {}", Self::qualified_table(schema))
    }

    /// `DELETE FROM <table> WHERE <pk> = $1`
    fn delete_sql(schema: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = $1",
            Self::qualified_table(schema),
            Self::primary_key_name()
        )
    }
}
