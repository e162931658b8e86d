//! Domain models for courses and the catalog.
//!
//! Catalog rows arrive in two historical wire shapes: detail fields
//! either nested under `details` or flattened onto the course object.
//! [`RawCourse`] accepts both; [`RawCourse::normalize`] folds everything
//! into the canonical shape before a row enters any cache tier.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single lesson in a course curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub duration: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Extended course metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub level: Option<String>,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub students: Option<u64>,
    pub language: Option<String>,
    pub last_updated: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A course in the catalog.
///
/// Canonical shape: detail fields live under `details` and
/// `price >= 0`, both guaranteed by the normalization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub details: Vec<CourseDetail>,
}

impl Course {
    /// First detail block, if the API provided one.
    pub fn detail(&self) -> Option<&CourseDetail> {
        self.details.first()
    }
}

/// Wire shape for a catalog row, tolerant of both historical layouts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCourse {
    #[serde(alias = "_id")]
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    price: f64,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    instructor: String,
    #[serde(default)]
    details: Vec<CourseDetail>,
    // Flattened variants of the detail fields seen in older payloads.
    level: Option<String>,
    category: Option<String>,
    rating: Option<f64>,
    students: Option<u64>,
}

impl RawCourse {
    /// Fold a wire row into the canonical shape.
    ///
    /// Returns `None` for rows that violate catalog invariants
    /// (negative price); nested detail fields win over flattened ones.
    pub fn normalize(self) -> Option<Course> {
        if self.price < 0.0 {
            warn!(course_id = %self.id, price = self.price, "Dropping catalog row with negative price");
            return None;
        }

        let mut details = self.details;
        let has_flattened = self.level.is_some()
            || self.category.is_some()
            || self.rating.is_some()
            || self.students.is_some();
        if has_flattened {
            if details.is_empty() {
                details.push(CourseDetail::default());
            }
            let head = &mut details[0];
            head.level = head.level.take().or(self.level);
            head.category = head.category.take().or(self.category);
            head.rating = head.rating.or(self.rating);
            head.students = head.students.or(self.students);
        }

        // Tags are a set; the wire format is a list.
        for detail in &mut details {
            detail.tags.sort();
            detail.tags.dedup();
        }

        Some(Course {
            id: self.id,
            title: self.title,
            description: self.description,
            price: self.price,
            duration: self.duration,
            image: self.image,
            instructor: self.instructor,
            details,
        })
    }
}

/// Normalize a whole catalog payload, dropping invalid rows.
pub fn normalize_catalog(rows: Vec<RawCourse>) -> Vec<Course> {
    rows.into_iter().filter_map(RawCourse::normalize).collect()
}

/// Filters for GET /courses/search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub rating: Option<f64>,
    pub language: Option<String>,
    pub instructor: Option<String>,
}

impl SearchFilters {
    pub(crate) fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref query) = self.query {
            params.push(("query", query.clone()));
        }
        if let Some(ref category) = self.category {
            params.push(("category", category.clone()));
        }
        if let Some(ref level) = self.level {
            params.push(("level", level.clone()));
        }
        if let Some(price_min) = self.price_min {
            params.push(("minPrice", price_min.to_string()));
        }
        if let Some(price_max) = self.price_max {
            params.push(("maxPrice", price_max.to_string()));
        }
        if let Some(rating) = self.rating {
            params.push(("rating", rating.to_string()));
        }
        if let Some(ref language) = self.language {
            params.push(("language", language.clone()));
        }
        if let Some(ref instructor) = self.instructor {
            params.push(("instructor", instructor.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawCourse {
        serde_json::from_value(json).expect("Failed to parse raw course")
    }

    #[test]
    fn test_normalize_folds_flattened_detail_fields() {
        let course = raw(serde_json::json!({
            "id": "1",
            "title": "Rust for the Web",
            "price": 49.0,
            "level": "beginner",
            "category": "programming",
            "rating": 4.5,
            "students": 120
        }))
        .normalize()
        .expect("Row should survive normalization");

        let detail = course.detail().expect("Detail block should exist");
        assert_eq!(detail.level.as_deref(), Some("beginner"));
        assert_eq!(detail.category.as_deref(), Some("programming"));
        assert_eq!(detail.rating, Some(4.5));
        assert_eq!(detail.students, Some(120));
    }

    #[test]
    fn test_normalize_prefers_nested_detail_fields() {
        let course = raw(serde_json::json!({
            "id": "1",
            "title": "Rust for the Web",
            "price": 49.0,
            "level": "advanced",
            "details": [{"level": "beginner", "tags": ["web", "rust", "web"]}]
        }))
        .normalize()
        .expect("Row should survive normalization");

        let detail = course.detail().expect("Detail block should exist");
        assert_eq!(detail.level.as_deref(), Some("beginner"));
        // Duplicate tags collapse into a set.
        assert_eq!(detail.tags, vec!["rust".to_string(), "web".to_string()]);
    }

    #[test]
    fn test_normalize_drops_negative_price() {
        let rows = vec![
            raw(serde_json::json!({"id": "1", "title": "Valid", "price": 0.0})),
            raw(serde_json::json!({"id": "2", "title": "Broken", "price": -10.0})),
        ];
        let catalog = normalize_catalog(rows);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, "1");
    }

    #[test]
    fn test_course_accepts_mongo_id_alias() {
        let course: Course = serde_json::from_value(serde_json::json!({
            "_id": "abc123",
            "title": "Aliased",
            "price": 15.0
        }))
        .expect("Failed to parse course with _id");
        assert_eq!(course.id, "abc123");
    }

    #[test]
    fn test_search_filters_query_params() {
        let filters = SearchFilters {
            query: Some("rust".to_string()),
            price_min: Some(10.0),
            price_max: Some(50.0),
            ..Default::default()
        };
        let params = filters.to_query();
        assert!(params.contains(&("query", "rust".to_string())));
        assert!(params.contains(&("minPrice", "10".to_string())));
        assert!(params.contains(&("maxPrice", "50".to_string())));
        assert_eq!(params.len(), 3);
    }
}
