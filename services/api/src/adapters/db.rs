//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` and `DocumentStore` ports from the `core` crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use adaptive_tutor_core::domain::{
    CacheEntry, ChatMessage, ChatRole, EnrichmentRecord, LearnerProfile, LearnerSession, Plan,
    PlanModule, Progress, Slide, SlideStatus, TrainingMaterial,
};
use adaptive_tutor_core::ports::{DatabaseService, DocumentStore, PortError, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn to_i32(value: usize, field: &str) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Unexpected(format!("{} {} does not fit the column", field, value)))
}

fn to_usize(value: i32, field: &str) -> PortResult<usize> {
    usize::try_from(value).map_err(|_| PortError::Unexpected(format!("negative {} {} in the database", field, value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct TrainingRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    content: String,
    content_hash: String,
}
impl TrainingRecord {
    fn to_domain(self) -> TrainingMaterial {
        TrainingMaterial {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            text: self.content,
            content_hash: self.content_hash,
        }
    }
}

#[derive(FromRow)]
struct LearnerSessionRecord {
    id: Uuid,
    training_id: Uuid,
    profile: Json<LearnerProfile>,
    enriched_profile: Json<EnrichmentRecord>,
    slides_viewed: i32,
    time_spent_secs: i64,
    last_slide_index: Option<i32>,
    created_at: DateTime<Utc>,
}
impl LearnerSessionRecord {
    fn to_domain(self) -> PortResult<LearnerSession> {
        Ok(LearnerSession {
            id: self.id,
            training_id: self.training_id,
            profile: self.profile.0,
            enriched_profile: self.enriched_profile.0,
            progress: Progress {
                slides_viewed: to_usize(self.slides_viewed, "slides_viewed")?,
                time_spent_secs: u64::try_from(self.time_spent_secs).unwrap_or(0),
                last_slide_index: self
                    .last_slide_index
                    .map(|i| to_usize(i, "last_slide_index"))
                    .transpose()?,
            },
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PlanRecord {
    session_id: Uuid,
    modules: Json<Vec<PlanModule>>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SlideRecord {
    slide_index: i32,
    module_index: i32,
    submodule_index: i32,
    title: String,
    status: String,
    content: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    viewed_at: Option<DateTime<Utc>>,
}
impl SlideRecord {
    fn to_domain(self) -> PortResult<Slide> {
        Ok(Slide {
            index: to_usize(self.slide_index, "slide_index")?,
            module_index: to_usize(self.module_index, "module_index")?,
            submodule_index: to_usize(self.submodule_index, "submodule_index")?,
            title: self.title,
            status: self.status.parse::<SlideStatus>().map_err(PortError::Unexpected)?,
            content: self.content,
            generated_at: self.generated_at,
            viewed_at: self.viewed_at,
        })
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    id: Uuid,
    learner_session_id: Uuid,
    slide_index: i32,
    role: String,
    text: String,
    created_at: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> PortResult<ChatMessage> {
        Ok(ChatMessage {
            id: self.id,
            learner_session_id: self.learner_session_id,
            slide_index: to_usize(self.slide_index, "slide_index")?,
            role: self.role.parse::<ChatRole>().map_err(PortError::Unexpected)?,
            text: self.text,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CacheEntryRecord {
    material_hash: String,
    provider_handle: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ttl_hours: i32,
}
impl CacheEntryRecord {
    fn to_domain(self) -> CacheEntry {
        CacheEntry {
            material_hash: self.material_hash,
            provider_handle: self.provider_handle,
            created_at: self.created_at,
            expires_at: self.expires_at,
            ttl_hours: u32::try_from(self.ttl_hours).unwrap_or(0),
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn get_material(&self, training_id: Uuid) -> PortResult<TrainingMaterial> {
        let record = sqlx::query_as::<_, TrainingRecord>(
            "SELECT id, owner_id, title, content, content_hash FROM trainings WHERE id = $1",
        )
        .bind(training_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("Training {} not found", training_id)))?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_learner_session(&self, session: LearnerSession) -> PortResult<LearnerSession> {
        let record = sqlx::query_as::<_, LearnerSessionRecord>(
            "INSERT INTO learner_sessions (id, training_id, profile, enriched_profile, slides_viewed, time_spent_secs, last_slide_index, created_at) \
             VALUES ($1, $2, $3, $4, 0, 0, NULL, $5) \
             RETURNING id, training_id, profile, enriched_profile, slides_viewed, time_spent_secs, last_slide_index, created_at",
        )
        .bind(session.id)
        .bind(session.training_id)
        .bind(Json(&session.profile))
        .bind(Json(&session.enriched_profile))
        .bind(session.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_learner_session(&self, session_id: Uuid) -> PortResult<LearnerSession> {
        let record = sqlx::query_as::<_, LearnerSessionRecord>(
            "SELECT id, training_id, profile, enriched_profile, slides_viewed, time_spent_secs, last_slide_index, created_at \
             FROM learner_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("Learner session {} not found", session_id)))?;
        record.to_domain()
    }

    async fn update_enriched_profile(&self, session_id: Uuid, profile: &EnrichmentRecord) -> PortResult<()> {
        let result = sqlx::query("UPDATE learner_sessions SET enriched_profile = $1 WHERE id = $2")
            .bind(Json(profile))
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Learner session {} not found", session_id)));
        }
        Ok(())
    }

    async fn update_progress(&self, session_id: Uuid, progress: &Progress) -> PortResult<()> {
        let last_slide_index = progress
            .last_slide_index
            .map(|i| to_i32(i, "last_slide_index"))
            .transpose()?;
        let time_spent = i64::try_from(progress.time_spent_secs).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "UPDATE learner_sessions SET slides_viewed = $1, time_spent_secs = $2, last_slide_index = $3 WHERE id = $4",
        )
        .bind(to_i32(progress.slides_viewed, "slides_viewed")?)
        .bind(time_spent)
        .bind(last_slide_index)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Learner session {} not found", session_id)));
        }
        Ok(())
    }

    async fn get_plan(&self, session_id: Uuid) -> PortResult<Option<Plan>> {
        let plan = sqlx::query_as::<_, PlanRecord>(
            "SELECT session_id, modules, created_at FROM plans WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        let Some(plan) = plan else {
            return Ok(None);
        };

        let slides = sqlx::query_as::<_, SlideRecord>(
            "SELECT slide_index, module_index, submodule_index, title, status, content, generated_at, viewed_at \
             FROM slides WHERE session_id = $1 ORDER BY slide_index ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(SlideRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;

        Ok(Some(Plan {
            session_id: plan.session_id,
            modules: plan.modules.0,
            slides,
            created_at: plan.created_at,
        }))
    }

    async fn save_plan(&self, plan: Plan) -> PortResult<Plan> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let inserted = sqlx::query(
            "INSERT INTO plans (session_id, modules, created_at) VALUES ($1, $2, $3) ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(plan.session_id)
        .bind(Json(&plan.modules))
        .bind(plan.created_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?
        .rows_affected();

        if inserted == 1 {
            for slide in &plan.slides {
                sqlx::query(
                    "INSERT INTO slides (session_id, slide_index, module_index, submodule_index, title, status, content, generated_at, viewed_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(plan.session_id)
                .bind(to_i32(slide.index, "slide_index")?)
                .bind(to_i32(slide.module_index, "module_index")?)
                .bind(to_i32(slide.submodule_index, "submodule_index")?)
                .bind(&slide.title)
                .bind(slide.status.as_str())
                .bind(slide.content.as_deref())
                .bind(slide.generated_at)
                .bind(slide.viewed_at)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            }
        }
        tx.commit().await.map_err(unexpected)?;

        self.get_plan(plan.session_id)
            .await?
            .ok_or_else(|| PortError::Unexpected(format!("Plan for session {} vanished after save", plan.session_id)))
    }

    async fn update_slide_content(
        &self,
        session_id: Uuid,
        slide_index: usize,
        status: SlideStatus,
        content: Option<&str>,
        generated_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE slides SET status = $1, content = $2, generated_at = $3 WHERE session_id = $4 AND slide_index = $5",
        )
        .bind(status.as_str())
        .bind(content)
        .bind(generated_at)
        .bind(session_id)
        .bind(to_i32(slide_index, "slide_index")?)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Slide {} of session {}", slide_index, session_id)));
        }
        Ok(())
    }

    async fn mark_slide_viewed(&self, session_id: Uuid, slide_index: usize, viewed_at: DateTime<Utc>) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE slides SET viewed_at = COALESCE(viewed_at, $1) WHERE session_id = $2 AND slide_index = $3",
        )
        .bind(viewed_at)
        .bind(session_id)
        .bind(to_i32(slide_index, "slide_index")?)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Slide {} of session {}", slide_index, session_id)));
        }
        Ok(())
    }

    async fn append_chat_message(&self, message: ChatMessage) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, learner_session_id, slide_index, role, text, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.id)
        .bind(message.learner_session_id)
        .bind(to_i32(message.slide_index, "slide_index")?)
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn recent_chat_messages(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<ChatMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, learner_session_id, slide_index, role, text, created_at FROM chat_messages \
             WHERE learner_session_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.reverse();
        records.into_iter().map(ChatMessageRecord::to_domain).collect()
    }

    async fn get_cache_entry(&self, material_hash: &str) -> PortResult<Option<CacheEntry>> {
        let record = sqlx::query_as::<_, CacheEntryRecord>(
            "SELECT material_hash, provider_handle, created_at, expires_at, ttl_hours FROM material_cache_entries WHERE material_hash = $1",
        )
        .bind(material_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(CacheEntryRecord::to_domain))
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> PortResult<()> {
        let ttl_hours = i32::try_from(entry.ttl_hours).unwrap_or(i32::MAX);
        sqlx::query(
            "INSERT INTO material_cache_entries (material_hash, provider_handle, created_at, expires_at, ttl_hours) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (material_hash) DO UPDATE SET provider_handle = EXCLUDED.provider_handle, \
             created_at = EXCLUDED.created_at, expires_at = EXCLUDED.expires_at, ttl_hours = EXCLUDED.ttl_hours",
        )
        .bind(&entry.material_hash)
        .bind(&entry.provider_handle)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .bind(ttl_hours)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_cache_entry(&self, material_hash: &str, provider_handle: &str) -> PortResult<bool> {
        let result = sqlx::query(
            "DELETE FROM material_cache_entries WHERE material_hash = $1 AND provider_handle = $2",
        )
        .bind(material_hash)
        .bind(provider_handle)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }
}
