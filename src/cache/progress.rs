//! Per-user progress cache with upsert-on-write merge.
//!
//! Same tier order and stale-fallback rules as the catalog cache, but
//! keyed by user. Writes merge the single returned record into the
//! cached collection instead of dropping it, so completing a lesson in
//! one course never costs a refetch of every other course's progress.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::{ApiError, HttpGateway};
use crate::auth::SessionShared;
use crate::models::{CourseProgress, LessonProgress, OverallProgress};

use super::storage::{progress_key, CacheEnvelope, Storage};

/// Number of entries returned by `recent_activity`.
const RECENT_ACTIVITY_LIMIT: usize = 5;

pub struct ProgressCache {
    gateway: HttpGateway,
    session: Arc<SessionShared>,
    storage: Storage,
    memory: RwLock<HashMap<String, CacheEnvelope<Vec<CourseProgress>>>>,
}

impl ProgressCache {
    pub(crate) fn new(gateway: HttpGateway, session: Arc<SessionShared>, storage: Storage) -> Self {
        Self {
            gateway,
            session,
            storage,
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// Progress for every course the user has touched. Tier order:
    /// fresh memory, fresh durable (promoted), then network with
    /// fallback to any cached payload, else empty.
    pub async fn get_user_progress(
        &self,
        user_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<CourseProgress>, ApiError> {
        if !force_refresh {
            {
                let memory = self.memory.read().await;
                if let Some(envelope) = memory.get(user_id) {
                    if envelope.is_fresh() {
                        return Ok(envelope.data.clone());
                    }
                }
            }
            if let Some(envelope) = self
                .storage
                .load_envelope::<Vec<CourseProgress>>(&progress_key(user_id))
            {
                if envelope.is_fresh() {
                    let data = envelope.data.clone();
                    self.memory
                        .write()
                        .await
                        .insert(user_id.to_string(), envelope);
                    return Ok(data);
                }
            }
        }
        self.refresh(user_id).await
    }

    async fn refresh(&self, user_id: &str) -> Result<Vec<CourseProgress>, ApiError> {
        match self.gateway.get::<Vec<CourseProgress>>("/progress/user").await {
            Ok(records) => {
                let envelope = CacheEnvelope::new(records.clone());
                self.storage.save_envelope(&progress_key(user_id), &envelope);
                self.memory
                    .write()
                    .await
                    .insert(user_id.to_string(), envelope);
                Ok(records)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Progress fetch failed, falling back to cache");
                {
                    let memory = self.memory.read().await;
                    if let Some(envelope) = memory.get(user_id) {
                        return Ok(envelope.data.clone());
                    }
                }
                if let Some(envelope) = self
                    .storage
                    .load_envelope::<Vec<CourseProgress>>(&progress_key(user_id))
                {
                    return Ok(envelope.data);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Single-course lookup. A cached entry answers regardless of the
    /// collection's freshness - an accepted inconsistency window traded
    /// for latency.
    pub async fn get_progress_for_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseProgress>, ApiError> {
        {
            let memory = self.memory.read().await;
            if let Some(record) = memory
                .get(user_id)
                .and_then(|envelope| envelope.data.iter().find(|p| p.course_id == course_id))
            {
                return Ok(Some(record.clone()));
            }
        }
        if let Some(envelope) = self
            .storage
            .load_envelope::<Vec<CourseProgress>>(&progress_key(user_id))
        {
            if let Some(record) = envelope.data.iter().find(|p| p.course_id == course_id) {
                return Ok(Some(record.clone()));
            }
        }

        // Miss on both tiers: refill the collection, then point fetch
        // for records the collection endpoint doesn't carry.
        let records = self.get_user_progress(user_id, false).await?;
        if let Some(record) = records.into_iter().find(|p| p.course_id == course_id) {
            return Ok(Some(record));
        }
        match self
            .gateway
            .get::<CourseProgress>(&format!("/progress/user/{}/course/{}", user_id, course_id))
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                debug!(course_id, error = %e, "Point progress fetch failed");
                Ok(None)
            }
        }
    }

    /// Record a lesson completion. The server's updated record is
    /// merged into the cached collection by course id - unrelated
    /// entries stay cached.
    pub async fn mark_lesson_complete(
        &self,
        course_id: &str,
        lesson_id: &str,
    ) -> Result<Option<CourseProgress>, ApiError> {
        let Some(identity) = self.session.identity().await else {
            return Err(ApiError::RequiresAuthentication);
        };

        let body = serde_json::json!({ "courseId": course_id, "lessonId": lesson_id });
        match self
            .gateway
            .post::<CourseProgress, _>("/progress/update", &body)
            .await
        {
            Ok(record) => {
                self.upsert(&identity.subject_id, record.clone()).await;
                Ok(Some(record))
            }
            Err(ApiError::InvalidResponse(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, user_id: &str, record: CourseProgress) {
        let mut memory = self.memory.write().await;
        let Some(envelope) = memory.get_mut(user_id) else {
            // No collection cached yet; don't fabricate a one-entry
            // collection, the next full read fetches everything.
            debug!(user_id, "No cached progress collection to merge into");
            return;
        };
        match envelope
            .data
            .iter_mut()
            .find(|p| p.course_id == record.course_id)
        {
            Some(existing) => *existing = record,
            None => envelope.data.push(record),
        }
        self.storage.save_envelope(&progress_key(user_id), envelope);
    }

    /// Record time spent and quiz score for a single lesson.
    pub async fn complete_lesson(
        &self,
        course_id: &str,
        lesson_id: &str,
        time_spent: u32,
        quiz_score: Option<f32>,
    ) -> Result<LessonProgress, ApiError> {
        let body = serde_json::json!({
            "courseId": course_id,
            "lessonId": lesson_id,
            "timeSpent": time_spent,
            "quizScore": quiz_score,
        });
        self.gateway.post("/progress/lesson/complete", &body).await
    }

    /// Totals across the user's courses, computed client-side.
    pub async fn overall_progress(&self, user_id: &str) -> Result<OverallProgress, ApiError> {
        let records = self.get_user_progress(user_id, false).await?;
        let total_courses = records.len();
        let completed_courses = records.iter().filter(|p| p.is_completed()).count();
        let average_progress = if total_courses == 0 {
            0
        } else {
            let sum: u32 = records.iter().map(|p| p.progress as u32).sum();
            (sum as f32 / total_courses as f32).round() as u8
        };
        Ok(OverallProgress {
            total_courses,
            completed_courses,
            average_progress,
        })
    }

    /// The most recently touched courses, newest first.
    pub async fn recent_activity(&self, user_id: &str) -> Result<Vec<CourseProgress>, ApiError> {
        let mut records = self.get_user_progress(user_id, false).await?;
        records.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        records.truncate(RECENT_ACTIVITY_LIMIT);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(course_id: &str, progress: u8) -> CourseProgress {
        serde_json::from_value(serde_json::json!({
            "courseId": course_id,
            "userId": "u1",
            "progress": progress,
            "completedLessons": [],
            "totalLessons": 10,
            "lastAccessed": Utc::now().to_rfc3339(),
            "startDate": Utc::now().to_rfc3339()
        }))
        .unwrap()
    }

    fn dead_progress(dir: &std::path::Path) -> ProgressCache {
        let storage = Storage::new(dir.to_path_buf()).unwrap();
        let shared = Arc::new(SessionShared::new(storage.clone()));
        let gateway = HttpGateway::new("http://127.0.0.1:9", Arc::clone(&shared)).unwrap();
        ProgressCache::new(gateway, shared, storage)
    }

    #[tokio::test]
    async fn test_stale_collection_survives_network_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dead_progress(dir.path());

        let stale = CacheEnvelope {
            data: vec![record("c1", 40)],
            fetched_at: Utc::now() - Duration::minutes(10),
        };
        cache.memory.write().await.insert("u1".to_string(), stale);

        let records = cache.get_user_progress("u1", false).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].course_id, "c1");
    }

    #[tokio::test]
    async fn test_upsert_replaces_only_matching_course() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dead_progress(dir.path());

        cache.memory.write().await.insert(
            "u1".to_string(),
            CacheEnvelope::new(vec![record("c1", 40), record("c2", 100)]),
        );

        cache.upsert("u1", record("c1", 60)).await;

        let memory = cache.memory.read().await;
        let data = &memory.get("u1").unwrap().data;
        assert_eq!(data.len(), 2);
        assert_eq!(data.iter().find(|p| p.course_id == "c1").unwrap().progress, 60);
        assert_eq!(data.iter().find(|p| p.course_id == "c2").unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_upsert_without_collection_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dead_progress(dir.path());

        cache.upsert("u1", record("c1", 60)).await;

        assert!(cache.memory.read().await.get("u1").is_none());
    }

    #[tokio::test]
    async fn test_per_course_lookup_ignores_collection_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dead_progress(dir.path());

        let stale = CacheEnvelope {
            data: vec![record("c1", 40)],
            fetched_at: Utc::now() - Duration::minutes(30),
        };
        cache.memory.write().await.insert("u1".to_string(), stale);

        let found = cache.get_progress_for_course("u1", "c1").await.unwrap();
        assert_eq!(found.unwrap().progress, 40);
    }

    #[tokio::test]
    async fn test_overall_progress_summary() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dead_progress(dir.path());

        cache.memory.write().await.insert(
            "u1".to_string(),
            CacheEnvelope::new(vec![record("c1", 50), record("c2", 100)]),
        );

        let overall = cache.overall_progress("u1").await.unwrap();
        assert_eq!(overall.total_courses, 2);
        assert_eq!(overall.completed_courses, 1);
        assert_eq!(overall.average_progress, 75);
    }
}
