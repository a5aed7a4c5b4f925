//! Temp cohort table creation and cohort materialization.

use super::Step;
use crate::context::StepContext;
use crate::core::{StepKind, StepOutput};
use crate::errors::GenflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A cohort to materialize into the session's temp table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortDefinition {
    /// Cohort definition identifier written to every row.
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Query yielding `subject_id, cohort_start_date, cohort_end_date`.
    pub expression_sql: String,
}

impl CohortDefinition {
    /// Creates a cohort definition.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, expression_sql: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            expression_sql: expression_sql.into(),
        }
    }
}

/// Produces the cohort definitions of a run.
pub type CohortSupplier =
    Arc<dyn Fn(&StepContext) -> Result<Vec<CohortDefinition>, GenflowError> + Send + Sync>;

/// Creates the session's temp cohort table.
///
/// The table is registered for cleanup before the create statement is
/// issued, so a create that fails half-way is still dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateTempTableStep;

#[async_trait]
impl Step for CreateTempTableStep {
    fn kind(&self) -> StepKind {
        StepKind::CreateTempTable
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let run = ctx.run();
        let dialect = &ctx.target_source().dialect;
        let table = run.qualified_temp_table();

        run.cleanup()
            .register(ctx.session_id(), run.temp_table(), dialect.clone());

        // Dropping first keeps a retried create from tripping over a table
        // committed by an attempt whose acknowledgement was lost.
        let statements = vec![
            run.renderer().drop_table(dialect, &table),
            run.renderer().create_cohort_table(dialect, &table),
        ];
        run.connection().execute_in_transaction(&statements).await?;

        info!(session_id = %ctx.session_id(), table = %table, "Created temp cohort table");
        Ok(StepOutput::ok_value("table", serde_json::json!(table)))
    }
}

/// Materializes cohort membership rows into the temp cohort table.
///
/// All definitions are inserted in one transaction.
#[derive(Clone)]
pub struct GenerateCohortStep {
    supplier: CohortSupplier,
}

impl GenerateCohortStep {
    /// Creates the step from a cohort supplier.
    #[must_use]
    pub fn new(supplier: CohortSupplier) -> Self {
        Self { supplier }
    }
}

impl fmt::Debug for GenerateCohortStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateCohortStep").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for GenerateCohortStep {
    fn kind(&self) -> StepKind {
        StepKind::GenerateCohort
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, GenflowError> {
        let definitions = (self.supplier)(ctx)?;

        if definitions.is_empty() {
            debug!(session_id = %ctx.session_id(), "No cohorts to generate");
            return Ok(StepOutput::ok_value("cohorts", serde_json::json!(0)));
        }

        let run = ctx.run();
        let dialect = &ctx.target_source().dialect;
        let table = run.qualified_temp_table();
        let statements: Vec<String> = definitions
            .iter()
            .map(|d| {
                run.renderer()
                    .insert_cohort(dialect, &table, d.id, &d.expression_sql)
            })
            .collect();

        let rows = run.connection().execute_in_transaction(&statements).await?;

        info!(
            session_id = %ctx.session_id(),
            cohorts = definitions.len(),
            rows,
            "Generated cohorts"
        );
        let mut data = std::collections::HashMap::new();
        data.insert("cohorts".to_string(), serde_json::json!(definitions.len()));
        data.insert("rows".to_string(), serde_json::json!(rows));
        Ok(StepOutput::ok(data))
    }
}
