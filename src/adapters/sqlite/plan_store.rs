//! SQLite implementation of plan and phase-output persistence.

use async_trait::async_trait;

use crate::adapters::sqlite::store::{required_ts, upsert_output, upsert_plan, SqliteStore};
use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{OutputSource, PhaseOutput, Plan, PlanPhase};
use crate::domain::ports::{OutputStore, PlanStore};

#[derive(sqlx::FromRow)]
struct PlanRow {
    task_id: String,
    version: i64,
    phases: String,
    updated_at: String,
}

impl TryFrom<PlanRow> for Plan {
    type Error = OrcError;

    fn try_from(row: PlanRow) -> OrcResult<Self> {
        let phases: Vec<PlanPhase> = serde_json::from_str(&row.phases)?;
        Ok(Plan {
            task_id: row.task_id,
            version: row.version,
            phases,
            updated_at: required_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl PlanStore for SqliteStore {
    async fn save_plan(&self, plan: &Plan) -> OrcResult<()> {
        let mut conn = self.pool().acquire().await?;
        upsert_plan(&mut conn, plan).await
    }

    async fn load_plan(&self, task_id: &str) -> OrcResult<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as("SELECT * FROM plans WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Plan::try_from).transpose()
    }

    async fn delete_plan(&self, task_id: &str) -> OrcResult<()> {
        let result = sqlx::query("DELETE FROM plans WHERE task_id = ?")
            .bind(task_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrcError::PlanNotFound(task_id.to_string()));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct OutputRow {
    task_id: String,
    phase: String,
    content: String,
    content_hash: String,
    source: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OutputRow> for PhaseOutput {
    type Error = OrcError;

    fn try_from(row: OutputRow) -> OrcResult<Self> {
        let source = OutputSource::from_str(&row.source)
            .ok_or_else(|| OrcError::SerializationError(format!("bad source '{}'", row.source)))?;
        Ok(PhaseOutput {
            task_id: row.task_id,
            phase: row.phase,
            content: row.content,
            content_hash: row.content_hash,
            source,
            created_at: required_ts(&row.created_at)?,
            updated_at: required_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl OutputStore for SqliteStore {
    async fn save_phase_output(&self, output: &PhaseOutput) -> OrcResult<()> {
        let mut conn = self.pool().acquire().await?;
        upsert_output(&mut conn, output).await
    }

    async fn load_phase_output(
        &self,
        task_id: &str,
        phase: &str,
    ) -> OrcResult<Option<PhaseOutput>> {
        let row: Option<OutputRow> =
            sqlx::query_as("SELECT * FROM phase_outputs WHERE task_id = ? AND phase = ?")
                .bind(task_id)
                .bind(phase)
                .fetch_optional(self.pool())
                .await?;
        row.map(PhaseOutput::try_from).transpose()
    }

    async fn list_phase_outputs(&self, task_id: &str) -> OrcResult<Vec<PhaseOutput>> {
        let rows: Vec<OutputRow> =
            sqlx::query_as("SELECT * FROM phase_outputs WHERE task_id = ? ORDER BY phase")
                .bind(task_id)
                .fetch_all(self.pool())
                .await?;
        rows.into_iter().map(PhaseOutput::try_from).collect()
    }

    async fn search_phase_outputs(
        &self,
        query: &str,
        limit: usize,
    ) -> OrcResult<Vec<PhaseOutput>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<OutputRow> = sqlx::query_as(
            r#"SELECT p.* FROM phase_outputs p
               JOIN (SELECT task_id, phase FROM phase_outputs_fts
                     WHERE phase_outputs_fts MATCH ?) f
                 ON f.task_id = p.task_id AND f.phase = p.phase
               LIMIT ?"#,
        )
        .bind(&sanitized)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(PhaseOutput::try_from).collect()
    }
}

/// FTS5 treats bare tokens like AND/OR/NOT and `col:` prefixes as
/// syntax. Quote every whitespace-delimited token (doubling interior
/// quotes) so user input is matched literally. Empty input yields an
/// empty string, which the caller treats as no results.
fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
