//! Server-synchronized cart and enrollment state.

mod store;

pub use store::CartSyncStore;
