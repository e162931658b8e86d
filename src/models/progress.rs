//! Learning-progress models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-course learning progress for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub course_id: String,
    pub user_id: String,
    /// 0-100; 100 is the terminal completed marker, enforced server-side.
    pub progress: u8,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    pub total_lessons: u32,
    pub last_accessed: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl CourseProgress {
    pub fn is_completed(&self) -> bool {
        self.progress >= 100
    }
}

/// Completion record for a single lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: String,
    pub course_id: String,
    pub user_id: String,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent: u32,
    #[serde(default)]
    pub quiz_score: Option<f32>,
}

/// Aggregate snapshot computed over a user's progress records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverallProgress {
    pub total_courses: usize,
    pub completed_courses: usize,
    pub average_progress: u8,
}
