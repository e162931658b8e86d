//! Progress cache behavior: collection caching, upsert-on-write merge,
//! and cache-first per-course lookups.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use coursecache::ApiError;

use common::*;

#[derive(Clone)]
struct ProgressState {
    records: Arc<Mutex<Vec<Value>>>,
    collection_hits: Arc<AtomicUsize>,
    update_hits: Arc<AtomicUsize>,
}

fn progress_router(state: ProgressState, token: String) -> Router {
    let list_state = state.clone();
    let update_state = state;

    Router::new()
        .route(
            "/auth/login",
            post(move || {
                let token = token.clone();
                async move { ok(json!({ "user": user_json("u1"), "accessToken": token })) }
            }),
        )
        .route(
            "/progress/user",
            get(move || {
                let state = list_state.clone();
                async move {
                    state.collection_hits.fetch_add(1, Ordering::SeqCst);
                    ok(json!(state.records.lock().unwrap().clone()))
                }
            }),
        )
        .route(
            "/progress/update",
            post(move |Json(body): Json<Value>| {
                let state = update_state.clone();
                async move {
                    state.update_hits.fetch_add(1, Ordering::SeqCst);
                    let course_id = body["courseId"].as_str().unwrap().to_string();
                    let mut records = state.records.lock().unwrap();
                    let record = records
                        .iter_mut()
                        .find(|row| row["courseId"] == json!(course_id))
                        .expect("unknown course in progress update");
                    record["progress"] = json!(60);
                    record["completedLessons"]
                        .as_array_mut()
                        .unwrap()
                        .push(body["lessonId"].clone());
                    ok(record.clone())
                }
            }),
        )
        .route(
            "/progress/user/:user_id/course/:course_id",
            get(|Path((user_id, course_id)): Path<(String, String)>| async move {
                ok(progress_json(&user_id, &course_id, 5))
            }),
        )
}

fn seeded_state() -> ProgressState {
    ProgressState {
        records: Arc::new(Mutex::new(vec![
            progress_json("u1", "c1", 40),
            progress_json("u1", "c2", 100),
        ])),
        collection_hits: Arc::new(AtomicUsize::new(0)),
        update_hits: Arc::new(AtomicUsize::new(0)),
    }
}

#[tokio::test]
async fn test_collection_reads_hit_the_network_once() {
    let state = seeded_state();
    let base = serve(progress_router(state.clone(), bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();

    let first = client.progress.get_user_progress("u1", false).await.unwrap();
    let second = client.progress.get_user_progress("u1", false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(state.collection_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mark_lesson_complete_upserts_without_refetch() {
    let state = seeded_state();
    let base = serve(progress_router(state.clone(), bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();
    client.progress.get_user_progress("u1", false).await.unwrap();

    let updated = client
        .progress
        .mark_lesson_complete("c1", "l2")
        .await
        .unwrap()
        .expect("server returned an updated record");
    assert_eq!(updated.progress, 60);
    assert_eq!(state.update_hits.load(Ordering::SeqCst), 1);

    // The merged record answers from cache; the unrelated course keeps
    // its cached entry; no collection refetch happens.
    let c1 = client
        .progress
        .get_progress_for_course("u1", "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c1.progress, 60);
    let c2 = client
        .progress
        .get_progress_for_course("u1", "c2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c2.progress, 100);
    assert_eq!(state.collection_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mark_lesson_complete_requires_authentication() {
    let state = seeded_state();
    let base = serve(progress_router(state.clone(), bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    let err = client
        .progress
        .mark_lesson_complete("c1", "l2")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RequiresAuthentication));
    assert_eq!(state.update_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_per_course_lookup_answers_from_cache() {
    let state = seeded_state();
    let base = serve(progress_router(state.clone(), bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();
    client.progress.get_user_progress("u1", false).await.unwrap();

    let found = client
        .progress
        .get_progress_for_course("u1", "c2")
        .await
        .unwrap();
    assert_eq!(found.unwrap().progress, 100);
    assert_eq!(state.collection_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_per_course_lookup_point_fetches_unknown_course() {
    let state = seeded_state();
    let base = serve(progress_router(state.clone(), bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();

    // Not in the collection: the cache refills once, then the point
    // endpoint answers.
    let found = client
        .progress
        .get_progress_for_course("u1", "c9")
        .await
        .unwrap();
    assert_eq!(found.unwrap().course_id, "c9");
    assert_eq!(state.collection_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_complete_lesson_records_time_and_score() {
    let state = seeded_state();
    let base = serve(
        progress_router(state, bearer_token("u1", "student", 60)).route(
            "/progress/lesson/complete",
            post(|Json(body): Json<Value>| async move {
                ok(json!({
                    "lessonId": body["lessonId"],
                    "courseId": body["courseId"],
                    "userId": "u1",
                    "completed": true,
                    "timeSpent": body["timeSpent"],
                    "quizScore": body["quizScore"],
                }))
            }),
        ),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();
    let lesson = client
        .progress
        .complete_lesson("c1", "l3", 540, Some(87.5))
        .await
        .unwrap();
    assert!(lesson.completed);
    assert_eq!(lesson.time_spent, 540);
    assert_eq!(lesson.quiz_score, Some(87.5));
}

#[tokio::test]
async fn test_recent_activity_and_overall_summary() {
    let state = seeded_state();
    let base = serve(progress_router(state, bearer_token("u1", "student", 60))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = test_client(&base, dir.path());

    client.session.login("u1@example.com", "pw").await.unwrap();

    let overall = client.progress.overall_progress("u1").await.unwrap();
    assert_eq!(overall.total_courses, 2);
    assert_eq!(overall.completed_courses, 1);
    assert_eq!(overall.average_progress, 70);

    let recent = client.progress.recent_activity("u1").await.unwrap();
    assert_eq!(recent.len(), 2);
}
