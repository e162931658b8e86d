//! Shared helpers for the integration tests: an in-process mock API
//! server and fixture builders.

#![allow(dead_code)]

use std::path::Path;

use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

/// Mint the unsigned bearer-token shape the backend issues.
pub fn bearer_token(sub: &str, role: &str, ttl_minutes: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = (Utc::now() + Duration::minutes(ttl_minutes)).timestamp();
    let claims = json!({
        "sub": sub,
        "role": role,
        "email": format!("{}@example.com", sub),
        "name": "Test User",
        "exp": exp,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.sig", header, payload)
}

/// Wrap a payload in the API's success envelope.
pub fn ok(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "firstName": "Test",
        "lastName": "User",
        "email": format!("{}@example.com", id),
        "name": "Test User"
    })
}

pub fn course_json(id: &str, title: &str, price: f64) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": "",
        "price": price,
        "duration": "6h",
        "image": "",
        "instructor": "Instructor"
    })
}

pub fn progress_json(user_id: &str, course_id: &str, progress: u8) -> Value {
    json!({
        "courseId": course_id,
        "userId": user_id,
        "progress": progress,
        "completedLessons": [],
        "totalLessons": 10,
        "lastAccessed": Utc::now().to_rfc3339(),
        "startDate": Utc::now().to_rfc3339()
    })
}

/// Serve a router on an ephemeral port, returning the base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A client wired to the given server, storing blobs in `dir`.
pub fn test_client(base_url: &str, dir: &Path) -> coursecache::Client {
    let config = coursecache::Config {
        api_base_url: base_url.to_string(),
        storage_dir: Some(dir.to_path_buf()),
    };
    coursecache::Client::new(&config).unwrap()
}
