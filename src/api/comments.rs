//! Typed client for course comments.

use crate::models::Comment;

use super::{ApiError, HttpGateway};

/// Thin CRUD surface over `/comments`. No cache tier - comments are
/// always read live.
pub struct CommentsApi {
    gateway: HttpGateway,
}

impl CommentsApi {
    pub(crate) fn new(gateway: HttpGateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Result<Vec<Comment>, ApiError> {
        self.gateway.get("/comments").await
    }

    pub async fn get(&self, id: &str) -> Result<Comment, ApiError> {
        self.gateway.get(&format!("/comments/{}", id)).await
    }

    pub async fn create(&self, comment: &Comment) -> Result<Comment, ApiError> {
        self.gateway.post("/comments", comment).await
    }

    pub async fn update(&self, id: &str, comment: &Comment) -> Result<Comment, ApiError> {
        self.gateway.put(&format!("/comments/{}", id), comment).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.gateway.delete_unit(&format!("/comments/{}", id)).await
    }
}
