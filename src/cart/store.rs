//! Server-authoritative cart and enrollment state.
//!
//! Published state always comes from a server response - there is no
//! optimistic update. Durable storage holds a best-effort offline
//! mirror, never the source of truth.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiError, HttpGateway};
use crate::auth::SessionShared;
use crate::cache::storage::{Storage, CART_KEY};
use crate::models::{normalize_catalog, Course, RawCourse};

/// GET /cart payload.
#[derive(Debug, Deserialize)]
struct CartSnapshot {
    #[serde(default)]
    cart: Vec<RawCourse>,
    #[serde(rename = "enrolledCourses", default)]
    enrolled_courses: Vec<RawCourse>,
}

/// Offline mirror blob.
#[derive(Debug, Serialize, Deserialize)]
struct CartMirror {
    cart: Vec<Course>,
    enrolled: Vec<Course>,
}

pub struct CartSyncStore {
    gateway: HttpGateway,
    session: Arc<SessionShared>,
    storage: Storage,
    cart_tx: watch::Sender<Vec<Course>>,
    enrolled_tx: watch::Sender<Vec<Course>>,
}

impl CartSyncStore {
    pub(crate) fn new(gateway: HttpGateway, session: Arc<SessionShared>, storage: Storage) -> Self {
        let (cart_tx, _) = watch::channel(Vec::new());
        let (enrolled_tx, _) = watch::channel(Vec::new());
        Self {
            gateway,
            session,
            storage,
            cart_tx,
            enrolled_tx,
        }
    }

    /// Cart stream; replays the last snapshot to new subscribers.
    pub fn cart(&self) -> watch::Receiver<Vec<Course>> {
        self.cart_tx.subscribe()
    }

    /// Enrollment stream; replays the last snapshot to new subscribers.
    pub fn enrolled(&self) -> watch::Receiver<Vec<Course>> {
        self.enrolled_tx.subscribe()
    }

    /// Pull the authoritative cart and enrollment state. Anonymous
    /// callers get both streams cleared without a network call.
    pub async fn load_cart_and_enrollments(&self) -> Result<(), ApiError> {
        if self.session.identity().await.is_none() {
            self.cart_tx.send_replace(Vec::new());
            self.enrolled_tx.send_replace(Vec::new());
            return Ok(());
        }

        let snapshot: CartSnapshot = self.gateway.get("/cart").await?;
        self.publish(
            normalize_catalog(snapshot.cart),
            normalize_catalog(snapshot.enrolled_courses),
        );
        Ok(())
    }

    /// Put a course in the cart. The response payload (the full updated
    /// cart) becomes the published state; adding an already-present
    /// course is idempotent because the server keys the cart by id.
    pub async fn add_to_cart(&self, course_id: &str) -> Result<Vec<Course>, ApiError> {
        if self.session.identity().await.is_none() {
            return Err(ApiError::RequiresAuthentication);
        }

        let rows: Vec<RawCourse> = self
            .gateway
            .post(&format!("/cart/cart/{}", course_id), &serde_json::json!({}))
            .await?;
        let cart = normalize_catalog(rows);
        self.cart_tx.send_replace(cart.clone());
        self.save_mirror();
        Ok(cart)
    }

    /// Drop a course from the cart, publishing the server's updated cart.
    pub async fn remove_from_cart(&self, course_id: &str) -> Result<Vec<Course>, ApiError> {
        let rows: Vec<RawCourse> = self
            .gateway
            .delete(&format!("/cart/cart/{}", course_id))
            .await?;
        let cart = normalize_catalog(rows);
        self.cart_tx.send_replace(cart.clone());
        self.save_mirror();
        Ok(cart)
    }

    /// Enroll in a course. The server moves it from cart to enrollment
    /// atomically; afterwards the full state is re-fetched, chained on
    /// the mutation, so cart and enrollment converge even when the
    /// response only carried the enrolled list.
    pub async fn enroll(&self, course_id: &str) -> Result<Vec<Course>, ApiError> {
        if self.session.identity().await.is_none() {
            return Err(ApiError::RequiresAuthentication);
        }

        let rows: Vec<RawCourse> = self
            .gateway
            .post(&format!("/cart/enroll/{}", course_id), &serde_json::json!({}))
            .await?;
        let enrolled = normalize_catalog(rows);
        self.enrolled_tx.send_replace(enrolled.clone());
        self.save_mirror();

        // A failed refresh keeps the response-derived state; the next
        // load converges.
        if let Err(e) = self.load_cart_and_enrollments().await {
            warn!(course_id, error = %e, "Post-enroll refresh failed");
        }

        Ok(enrolled)
    }

    /// Republish the last mirrored snapshot, for process start while
    /// offline. Returns whether a mirror existed. Never invoked
    /// implicitly - live state always wins.
    pub fn restore_offline_mirror(&self) -> bool {
        match self.storage.load::<CartMirror>(CART_KEY) {
            Ok(Some(mirror)) => {
                self.publish(mirror.cart, mirror.enrolled);
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(error = %e, "No usable cart mirror");
                false
            }
        }
    }

    fn publish(&self, cart: Vec<Course>, enrolled: Vec<Course>) {
        self.cart_tx.send_replace(cart);
        self.enrolled_tx.send_replace(enrolled);
        self.save_mirror();
    }

    fn save_mirror(&self) {
        let mirror = CartMirror {
            cart: self.cart_tx.borrow().clone(),
            enrolled: self.enrolled_tx.borrow().clone(),
        };
        if let Err(e) = self.storage.save(CART_KEY, &mirror) {
            warn!(error = %e, "Failed to write cart mirror");
        }
    }
}
