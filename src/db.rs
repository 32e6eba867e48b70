use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::config::Settings;
use crate::error::ReportResult;
use crate::models::Statement;
use crate::query::QueryPlan;

/// Store of learning-activity statements. One call executes a whole plan
/// and returns the materialized, finite result set in arrival order.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn find(&self, plan: &QueryPlan) -> ReportResult<Vec<Statement>>;
}

pub async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Statements stored as JSONB rows in `statements (id, lrs_id, statement)`.
pub struct PgRecordSource {
    pool: PgPool,
}

impl PgRecordSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn find(&self, plan: &QueryPlan) -> ReportResult<Vec<Statement>> {
        let mut query = plan.to_sql();
        tracing::debug!(sql = query.sql(), "running statement query");

        let bodies: Vec<Json<Value>> = query
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;

        let tenant_id = &plan.base().tenant_id;
        Ok(bodies
            .into_iter()
            .map(|Json(body)| Statement::new(tenant_id.clone(), body))
            .collect())
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;

    /// Evaluates plans in process over a fixed list of statements.
    #[derive(Default)]
    pub struct MemorySource {
        pub statements: Vec<Statement>,
    }

    impl MemorySource {
        pub fn new(statements: Vec<Statement>) -> Self {
            Self { statements }
        }
    }

    #[async_trait]
    impl RecordSource for MemorySource {
        async fn find(&self, plan: &QueryPlan) -> ReportResult<Vec<Statement>> {
            Ok(self
                .statements
                .iter()
                .filter(|statement| plan.matches(statement))
                .cloned()
                .collect())
        }
    }
}
