use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use voyage_core::TripPlan;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPlanSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPlan {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub plan: TripPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner-scoped persistence for generated plans. Every operation takes the
/// authenticated owner identity; a plan is invisible outside its owner.
pub trait PlanRepository: Send + Sync {
    async fn save_plan(&self, name: &str, plan: &TripPlan, owner_id: &str) -> Result<String>;
    async fn list_plans(&self, owner_id: &str) -> Result<Vec<SavedPlanSummary>>;
    async fn get_plan(&self, id: &str, owner_id: &str) -> Result<Option<SavedPlan>>;
    async fn delete_plan(&self, id: &str, owner_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    plans: Arc<RwLock<HashMap<String, SavedPlan>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanRepository for MemoryStore {
    async fn save_plan(&self, name: &str, plan: &TripPlan, owner_id: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.plans.write().insert(
            id.clone(),
            SavedPlan {
                id: id.clone(),
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                plan: plan.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn list_plans(&self, owner_id: &str) -> Result<Vec<SavedPlanSummary>> {
        let mut summaries: Vec<SavedPlanSummary> = self
            .plans
            .read()
            .values()
            .filter(|saved| saved.owner_id == owner_id)
            .map(|saved| SavedPlanSummary {
                id: saved.id.clone(),
                name: saved.name.clone(),
                created_at: saved.created_at,
                updated_at: saved.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn get_plan(&self, id: &str, owner_id: &str) -> Result<Option<SavedPlan>> {
        Ok(self
            .plans
            .read()
            .get(id)
            .filter(|saved| saved.owner_id == owner_id)
            .cloned())
    }

    async fn delete_plan(&self, id: &str, owner_id: &str) -> Result<bool> {
        let mut guard = self.plans.write();
        let owned = guard
            .get(id)
            .is_some_and(|saved| saved.owner_id == owner_id);
        if owned {
            guard.remove(id);
        }
        Ok(owned)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS travel_plans (
              id TEXT PRIMARY KEY,
              owner_id TEXT NOT NULL,
              name TEXT NOT NULL,
              plan_json TEXT NOT NULL,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_travel_plans_owner ON travel_plans (owner_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl PlanRepository for SqliteStore {
    async fn save_plan(&self, name: &str, plan: &TripPlan, owner_id: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let plan_json = serde_json::to_string(plan)?;

        sqlx::query(
            r#"
            INSERT INTO travel_plans (id, owner_id, name, plan_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(name)
        .bind(plan_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_plans(&self, owner_id: &str) -> Result<Vec<SavedPlanSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at, updated_at
            FROM travel_plans
            WHERE owner_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let summaries = rows
            .into_iter()
            .map(|row| SavedPlanSummary {
                id: row.get("id"),
                name: row.get("name"),
                created_at: parse_timestamp(row.get::<String, _>("created_at").as_str()),
                updated_at: parse_timestamp(row.get::<String, _>("updated_at").as_str()),
            })
            .collect();

        Ok(summaries)
    }

    async fn get_plan(&self, id: &str, owner_id: &str) -> Result<Option<SavedPlan>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, name, plan_json, created_at, updated_at
            FROM travel_plans
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let plan_json: String = row.get("plan_json");
        let plan = serde_json::from_str(&plan_json)
            .with_context(|| format!("corrupt plan_json for travel plan {}", id))?;

        Ok(Some(SavedPlan {
            id: row.get("id"),
            name: row.get("name"),
            owner_id: row.get("owner_id"),
            plan,
            created_at: parse_timestamp(row.get::<String, _>("created_at").as_str()),
            updated_at: parse_timestamp(row.get::<String, _>("updated_at").as_str()),
        }))
    }

    async fn delete_plan(&self, id: &str, owner_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM travel_plans WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }
}

impl PlanRepository for Store {
    async fn save_plan(&self, name: &str, plan: &TripPlan, owner_id: &str) -> Result<String> {
        match self {
            Store::Memory(store) => store.save_plan(name, plan, owner_id).await,
            Store::Sqlite(store) => store.save_plan(name, plan, owner_id).await,
        }
    }

    async fn list_plans(&self, owner_id: &str) -> Result<Vec<SavedPlanSummary>> {
        match self {
            Store::Memory(store) => store.list_plans(owner_id).await,
            Store::Sqlite(store) => store.list_plans(owner_id).await,
        }
    }

    async fn get_plan(&self, id: &str, owner_id: &str) -> Result<Option<SavedPlan>> {
        match self {
            Store::Memory(store) => store.get_plan(id, owner_id).await,
            Store::Sqlite(store) => store.get_plan(id, owner_id).await,
        }
    }

    async fn delete_plan(&self, id: &str, owner_id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.delete_plan(id, owner_id).await,
            Store::Sqlite(store) => store.delete_plan(id, owner_id).await,
        }
    }
}
