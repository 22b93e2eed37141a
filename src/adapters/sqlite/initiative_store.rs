//! SQLite implementation of initiative persistence and atomic manifest
//! materialisation.

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::adapters::sqlite::store::{
    required_ts, upsert_output, upsert_task, SqliteStore,
};
use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{Initiative, PhaseOutput, Task};
use crate::domain::ports::InitiativeStore;

#[derive(sqlx::FromRow)]
struct InitiativeRow {
    id: String,
    title: String,
    vision: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<InitiativeRow> for Initiative {
    type Error = OrcError;

    fn try_from(row: InitiativeRow) -> OrcResult<Self> {
        Ok(Initiative {
            id: row.id,
            title: row.title,
            vision: row.vision,
            created_at: required_ts(&row.created_at)?,
            updated_at: required_ts(&row.updated_at)?,
        })
    }
}

async fn upsert_initiative(
    conn: &mut SqliteConnection,
    initiative: &Initiative,
) -> OrcResult<()> {
    sqlx::query(
        r#"INSERT INTO initiatives (id, title, vision, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               vision = excluded.vision,
               updated_at = excluded.updated_at"#,
    )
    .bind(&initiative.id)
    .bind(&initiative.title)
    .bind(&initiative.vision)
    .bind(initiative.created_at.to_rfc3339())
    .bind(initiative.updated_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl InitiativeStore for SqliteStore {
    async fn save_initiative(&self, initiative: &Initiative) -> OrcResult<()> {
        let mut conn = self.pool().acquire().await?;
        upsert_initiative(&mut conn, initiative).await
    }

    async fn load_initiative(&self, id: &str) -> OrcResult<Option<Initiative>> {
        let row: Option<InitiativeRow> =
            sqlx::query_as("SELECT * FROM initiatives WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(Initiative::try_from).transpose()
    }

    async fn create_initiative_tasks(
        &self,
        initiative: Option<&Initiative>,
        tasks: &[Task],
        outputs: &[PhaseOutput],
    ) -> OrcResult<()> {
        let initiative = initiative.cloned();
        let tasks = tasks.to_vec();
        let outputs = outputs.to_vec();
        self.transaction(move |tx| {
            Box::pin(async move {
                if let Some(initiative) = &initiative {
                    upsert_initiative(tx, initiative).await?;
                }
                for task in &tasks {
                    upsert_task(tx, task).await?;
                }
                for output in &outputs {
                    upsert_output(tx, output).await?;
                }
                Ok(())
            })
        })
        .await
    }
}
