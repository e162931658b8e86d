//! Time-boxed course-catalog cache.
//!
//! Two tiers (memory, durable) over the full catalog with a 5-minute
//! freshness window. Network failures fall back to whichever tier still
//! holds a payload - a stale catalog beats an error page. Catalog
//! mutations invalidate both tiers before returning, so the next read
//! always observes the mutation.

use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use crate::api::{ApiError, HttpGateway};
use crate::models::{normalize_catalog, Course, RawCourse, SearchFilters};

use super::storage::{CacheEnvelope, Storage, COURSES_KEY};

pub struct CourseCache {
    gateway: HttpGateway,
    storage: Storage,
    memory: RwLock<Option<CacheEnvelope<Vec<Course>>>>,
    catalog_tx: watch::Sender<Vec<Course>>,
}

impl CourseCache {
    pub(crate) fn new(gateway: HttpGateway, storage: Storage) -> Self {
        let (catalog_tx, _) = watch::channel(Vec::new());
        Self {
            gateway,
            storage,
            memory: RwLock::new(None),
            catalog_tx,
        }
    }

    /// Catalog stream: re-emits on every network refresh and replays
    /// the last snapshot to new subscribers.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Course>> {
        self.catalog_tx.subscribe()
    }

    /// The full catalog. Tier order: fresh memory, fresh durable
    /// (promoted to memory), then network. A failed fetch falls back to
    /// any cached payload, else resolves to empty - never an error.
    pub async fn get_all_courses(&self, force_refresh: bool) -> Result<Vec<Course>, ApiError> {
        if !force_refresh {
            {
                let memory = self.memory.read().await;
                if let Some(envelope) = memory.as_ref() {
                    if envelope.is_fresh() {
                        return Ok(envelope.data.clone());
                    }
                }
            }
            if let Some(envelope) = self.storage.load_envelope::<Vec<Course>>(COURSES_KEY) {
                if envelope.is_fresh() {
                    debug!(count = envelope.data.len(), "Promoting durable catalog to memory");
                    let data = envelope.data.clone();
                    *self.memory.write().await = Some(envelope);
                    return Ok(data);
                }
            }
        }
        self.refresh().await
    }

    /// Fetch the catalog, replacing both tiers and publishing to
    /// subscribers. Falls back tier by tier on failure.
    async fn refresh(&self) -> Result<Vec<Course>, ApiError> {
        match self.gateway.get::<Vec<RawCourse>>("/courses").await {
            Ok(rows) => {
                let courses = normalize_catalog(rows);
                let envelope = CacheEnvelope::new(courses.clone());
                self.storage.save_envelope(COURSES_KEY, &envelope);
                *self.memory.write().await = Some(envelope);
                self.catalog_tx.send_replace(courses.clone());
                Ok(courses)
            }
            Err(e) => {
                warn!(error = %e, "Catalog fetch failed, falling back to cache");
                {
                    let memory = self.memory.read().await;
                    if let Some(envelope) = memory.as_ref() {
                        return Ok(envelope.data.clone());
                    }
                }
                if let Some(envelope) = self.storage.load_envelope::<Vec<Course>>(COURSES_KEY) {
                    return Ok(envelope.data);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Single course lookup, catalog first: a catalog read (cached or
    /// fetched) fills the cache for the next lookup, so it is preferred
    /// over a point fetch.
    pub async fn get_course_by_id(&self, id: &str) -> Result<Option<Course>, ApiError> {
        let catalog = self.get_all_courses(false).await?;
        if let Some(course) = catalog.iter().find(|course| course.id == id) {
            return Ok(Some(course.clone()));
        }

        // Not in the catalog (unlisted or just published): point fetch,
        // resolving failures to absence.
        match self.gateway.get::<RawCourse>(&format!("/courses/{}", id)).await {
            Ok(raw) => Ok(raw.normalize()),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => {
                debug!(course_id = id, error = %e, "Point fetch failed");
                Ok(None)
            }
        }
    }

    /// Drop both tiers, forcing the next read to refetch.
    pub async fn invalidate(&self) {
        *self.memory.write().await = None;
        if let Err(e) = self.storage.remove(COURSES_KEY) {
            warn!(error = %e, "Failed to clear durable catalog");
        }
        debug!("Catalog cache invalidated");
    }

    // ===== Admin/instructor mutations =====
    // Each one invalidates before returning, so the next read observes
    // the mutation regardless of the outcome here.

    pub async fn create_course(&self, course: &Course) -> Result<Course, ApiError> {
        let result: Result<RawCourse, ApiError> = self.gateway.post("/courses", course).await;
        self.invalidate().await;
        Self::into_course(result?)
    }

    pub async fn update_course(&self, id: &str, course: &Course) -> Result<Course, ApiError> {
        let result: Result<RawCourse, ApiError> =
            self.gateway.put(&format!("/courses/{}", id), course).await;
        self.invalidate().await;
        Self::into_course(result?)
    }

    pub async fn delete_course(&self, id: &str) -> Result<(), ApiError> {
        let result = self.gateway.delete_unit(&format!("/courses/{}", id)).await;
        self.invalidate().await;
        result
    }

    fn into_course(raw: RawCourse) -> Result<Course, ApiError> {
        raw.normalize().ok_or_else(|| {
            ApiError::InvalidResponse("course mutation returned an invalid row".to_string())
        })
    }

    // ===== Pass-throughs (no catalog tier) =====

    /// Featured picks. Resolves to empty on failure, like catalog reads.
    pub async fn featured(&self) -> Result<Vec<Course>, ApiError> {
        match self.gateway.get::<Vec<RawCourse>>("/courses/featured").await {
            Ok(rows) => Ok(normalize_catalog(rows)),
            Err(e) => {
                debug!(error = %e, "Featured fetch failed");
                Ok(Vec::new())
            }
        }
    }

    /// Server-side catalog search. Resolves to empty on failure.
    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<Course>, ApiError> {
        match self
            .gateway
            .get_query::<Vec<RawCourse>>("/courses/search", &filters.to_query())
            .await
        {
            Ok(rows) => Ok(normalize_catalog(rows)),
            Err(e) => {
                debug!(error = %e, "Search failed");
                Ok(Vec::new())
            }
        }
    }

    /// The catalog minus courses the user is already enrolled in.
    pub async fn recommendations(&self, enrolled_ids: &[String]) -> Result<Vec<Course>, ApiError> {
        let catalog = self.get_all_courses(false).await?;
        Ok(catalog
            .into_iter()
            .filter(|course| !enrolled_ids.contains(&course.id))
            .collect())
    }
}
