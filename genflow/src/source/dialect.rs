//! SQL dialect identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The SQL variant spoken by a target source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dialect {
    /// PostgreSQL.
    PostgreSql,
    /// Microsoft SQL Server.
    SqlServer,
    /// Oracle.
    Oracle,
    /// Amazon Redshift.
    Redshift,
    /// Google BigQuery.
    BigQuery,
    /// Snowflake.
    Snowflake,
    /// Apache Spark / Databricks.
    Spark,
    /// Any other dialect, by name.
    Other(String),
}

impl Dialect {
    /// Returns the canonical dialect name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PostgreSql => "postgresql",
            Self::SqlServer => "sql server",
            Self::Oracle => "oracle",
            Self::Redshift => "redshift",
            Self::BigQuery => "bigquery",
            Self::Snowflake => "snowflake",
            Self::Spark => "spark",
            Self::Other(name) => name,
        }
    }

    /// Returns true if `DROP TABLE IF EXISTS` is supported verbatim.
    #[must_use]
    pub fn supports_drop_if_exists(&self) -> bool {
        !matches!(self, Self::SqlServer | Self::Oracle)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::PostgreSql
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dialect = match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Self::PostgreSql,
            "sql server" | "sqlserver" | "mssql" | "pdw" => Self::SqlServer,
            "oracle" => Self::Oracle,
            "redshift" => Self::Redshift,
            "bigquery" => Self::BigQuery,
            "snowflake" => Self::Snowflake,
            "spark" | "databricks" => Self::Spark,
            other => Self::Other(other.to_string()),
        };
        Ok(dialect)
    }
}

impl From<&str> for Dialect {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(dialect) => dialect,
            Err(never) => match never {},
        }
    }
}

impl From<String> for Dialect {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Dialect> for String {
    fn from(value: Dialect) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_aliases() {
        assert_eq!(Dialect::from("pg"), Dialect::PostgreSql);
        assert_eq!(Dialect::from("PostgreSQL"), Dialect::PostgreSql);
        assert_eq!(Dialect::from("mssql"), Dialect::SqlServer);
        assert_eq!(Dialect::from("duckdb"), Dialect::Other("duckdb".to_string()));
    }

    #[test]
    fn test_drop_if_exists_support() {
        assert!(Dialect::PostgreSql.supports_drop_if_exists());
        assert!(!Dialect::Oracle.supports_drop_if_exists());
        assert!(!Dialect::SqlServer.supports_drop_if_exists());
    }

    #[test]
    fn test_dialect_serialize() {
        let json = serde_json::to_string(&Dialect::BigQuery).unwrap();
        assert_eq!(json, r#""bigquery""#);

        let parsed: Dialect = serde_json::from_str(r#""sql server""#).unwrap();
        assert_eq!(parsed, Dialect::SqlServer);
    }
}
