//! Outbound HTTP: the gateway, the error taxonomy, and the thin
//! comments client.

mod comments;
mod error;
mod gateway;

pub use comments::CommentsApi;
pub use error::ApiError;
pub use gateway::HttpGateway;
