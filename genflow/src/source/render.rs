//! Rendering of the statements the orchestration core issues itself.
//!
//! Analysis SQL is produced by collaborators; only temp-table lifecycle and
//! cohort materialization statements live here.

use super::Dialect;
use std::fmt::Debug;

/// Renders dialect-specific lifecycle statements for temporary tables.
pub trait StatementRenderer: Send + Sync + Debug {
    /// Statement creating an empty cohort table named `table`.
    fn create_cohort_table(&self, dialect: &Dialect, table: &str) -> String;

    /// Statement dropping `table`, succeeding when it does not exist.
    fn drop_table(&self, dialect: &Dialect, table: &str) -> String;

    /// Statement materializing the rows produced by `expression_sql` as cohort `cohort_id`.
    fn insert_cohort(
        &self,
        dialect: &Dialect,
        table: &str,
        cohort_id: i64,
        expression_sql: &str,
    ) -> String;
}

/// Plain per-dialect statements for the cohort table layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

const COHORT_COLUMNS: &str = "cohort_definition_id, subject_id, cohort_start_date, cohort_end_date";

impl StatementRenderer for DefaultRenderer {
    fn create_cohort_table(&self, dialect: &Dialect, table: &str) -> String {
        let (int_type, date_type) = match dialect {
            Dialect::Oracle => ("NUMBER(19)", "DATE"),
            Dialect::BigQuery => ("INT64", "DATE"),
            _ => ("BIGINT", "DATE"),
        };
        format!(
            "CREATE TABLE {table} (cohort_definition_id {int_type}, subject_id {int_type}, \
             cohort_start_date {date_type}, cohort_end_date {date_type})"
        )
    }

    fn drop_table(&self, dialect: &Dialect, table: &str) -> String {
        match dialect {
            Dialect::SqlServer => {
                format!("IF OBJECT_ID('{table}', 'U') IS NOT NULL DROP TABLE {table}")
            }
            Dialect::Oracle => format!(
                "BEGIN EXECUTE IMMEDIATE 'DROP TABLE {table}'; \
                 EXCEPTION WHEN OTHERS THEN IF SQLCODE != -942 THEN RAISE; END IF; END;"
            ),
            _ => format!("DROP TABLE IF EXISTS {table}"),
        }
    }

    fn insert_cohort(
        &self,
        _dialect: &Dialect,
        table: &str,
        cohort_id: i64,
        expression_sql: &str,
    ) -> String {
        format!(
            "INSERT INTO {table} ({COHORT_COLUMNS}) \
             SELECT {cohort_id}, subject_id, cohort_start_date, cohort_end_date \
             FROM ({expression_sql}) cohort_rows"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_statements_per_dialect() {
        let r = DefaultRenderer;
        assert_eq!(
            r.drop_table(&Dialect::PostgreSql, "temp_cohort_S1"),
            "DROP TABLE IF EXISTS temp_cohort_S1"
        );
        assert!(r
            .drop_table(&Dialect::SqlServer, "temp_cohort_S1")
            .starts_with("IF OBJECT_ID('temp_cohort_S1'"));
        assert!(r.drop_table(&Dialect::Oracle, "t").contains("-942"));
    }

    #[test]
    fn test_create_uses_dialect_types() {
        let r = DefaultRenderer;
        assert!(r.create_cohort_table(&Dialect::BigQuery, "t").contains("INT64"));
        assert!(r.create_cohort_table(&Dialect::Oracle, "t").contains("NUMBER(19)"));
        assert!(r.create_cohort_table(&Dialect::PostgreSql, "t").contains("BIGINT"));
    }

    #[test]
    fn test_insert_wraps_expression() {
        let sql = DefaultRenderer.insert_cohort(&Dialect::PostgreSql, "t", 7, "SELECT * FROM x");
        assert!(sql.starts_with("INSERT INTO t ("));
        assert!(sql.contains("SELECT 7, subject_id"));
        assert!(sql.ends_with("FROM (SELECT * FROM x) cohort_rows"));
    }
}
