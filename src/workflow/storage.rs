/// SQLite persistence layer for workflows and run records
///
/// Handles workflow CRUD operations and keeps a history of execution runs.
/// Definitions and run states are stored as JSON text while id, name and
/// timestamps stay queryable columns.

use crate::workflow::types::{ExecutionState, Workflow};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

/// SQLite-based workflow storage manager
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

/// Basic workflow metadata for listing operations
#[derive(Debug, Serialize)]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One persisted workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub workflow_id: String,
    /// "succeeded" or "failed"
    pub status: String,
    pub user_id: String,
    pub input: String,
    pub started_at: String,
    pub finished_at: String,
    pub state: ExecutionState,
}

impl RunRecord {
    /// Wrap a finished run
    pub fn new(
        workflow_id: impl Into<String>,
        user_id: impl Into<String>,
        input: impl Into<String>,
        started_at: chrono::DateTime<chrono::Utc>,
        state: ExecutionState,
    ) -> Self {
        let status = if state.succeeded() { "succeeded" } else { "failed" };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: status.to_string(),
            user_id: user_id.into(),
            input: input.into(),
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            state,
        }
    }
}

impl WorkflowStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database; one connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }

    /// Close the pool; later queries fail
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize the storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_name ON workflows(name)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                user_id TEXT NOT NULL,
                input TEXT NOT NULL,
                state TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_runs_workflow ON workflow_runs(workflow_id, started_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new workflow
    ///
    /// Returns `false` without touching the stored row when the id is taken.
    pub async fn insert_workflow(&self, workflow: &Workflow) -> Result<bool> {
        let definition_json = serde_json::to_string(workflow)?;
        let now = chrono::Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            "INSERT INTO workflows (id, name, definition, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a new workflow or update existing one
    ///
    /// Uses UPSERT to handle both create and update operations atomically.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow by ID
    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let workflow: Workflow = serde_json::from_str(&definition_json)?;
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    /// List all workflows with basic metadata
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, created_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkflowMetadata {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Load all workflows for registry initialization
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT id, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            let workflow: Workflow = serde_json::from_str(&definition_json)?;
            workflows.insert(id, workflow);
        }

        Ok(workflows)
    }

    /// Delete a workflow by ID; its run history goes with it
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM workflow_runs WHERE workflow_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist a finished run
    pub async fn save_run(&self, run: &RunRecord) -> Result<()> {
        let state_json = serde_json::to_string(&run.state)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_runs (id, workflow_id, status, user_id, input, state, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.workflow_id)
        .bind(&run.status)
        .bind(&run.user_id)
        .bind(&run.input)
        .bind(&state_json)
        .bind(&run.started_at)
        .bind(&run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent runs of a workflow, newest first
    pub async fn list_runs(&self, workflow_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, status, user_id, input, state, started_at, finished_at
            FROM workflow_runs WHERE workflow_id = ?
            ORDER BY started_at DESC LIMIT ?
            "#,
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    /// Retrieve a run by ID
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, workflow_id, status, user_id, input, state, started_at, finished_at
            FROM workflow_runs WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RunRecord> {
    let state_json: String = row.get("state");
    Ok(RunRecord {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        status: row.get("status"),
        user_id: row.get("user_id"),
        input: row.get("input"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        state: serde_json::from_str(&state_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node, NodeKind};
    use serde_json::Value;

    async fn storage() -> WorkflowStorage {
        let storage = WorkflowStorage::in_memory().await.unwrap();
        storage.init_schema().await.unwrap();
        storage
    }

    fn sample() -> Workflow {
        Workflow {
            id: "wf-1".to_string(),
            name: "Echo".to_string(),
            nodes: vec![Node::new("in", NodeKind::Input), Node::new("out", NodeKind::Output)],
            edges: vec![Edge::new("in", "out")],
            config: Value::Null,
        }
    }

    #[tokio::test]
    async fn test_workflow_crud() {
        let storage = storage().await;
        let mut workflow = sample();
        storage.save_workflow(&workflow).await.unwrap();

        workflow.name = "Echo v2".to_string();
        storage.save_workflow(&workflow).await.unwrap();

        let loaded = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Echo v2");
        assert_eq!(loaded.nodes.len(), 2);

        let listed = storage.list_workflows().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(storage.load_all_workflows().await.unwrap().len(), 1);

        assert!(storage.delete_workflow("wf-1").await.unwrap());
        assert!(!storage.delete_workflow("wf-1").await.unwrap());
        assert!(storage.get_workflow("wf-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_workflow() {
        let storage = storage().await;
        assert!(storage.insert_workflow(&sample()).await.unwrap());

        let mut other = sample();
        other.name = "Impostor".to_string();
        assert!(!storage.insert_workflow(&other).await.unwrap());

        let loaded = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Echo");
    }

    #[tokio::test]
    async fn test_run_history() {
        let storage = storage().await;
        let mut state = ExecutionState::new("hi");
        state.output = Some("hi".into());
        state.record("node in (input) completed");

        let run = RunRecord::new("wf-1", "user-1", "hi", chrono::Utc::now(), state);
        assert_eq!(run.status, "succeeded");
        storage.save_run(&run).await.unwrap();

        let fetched = storage.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched, run);

        let runs = storage.list_runs("wf-1", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(storage.list_runs("other", 10).await.unwrap().is_empty());
        assert!(storage.get_run("missing").await.unwrap().is_none());
    }
}
