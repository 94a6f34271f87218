//! Mirrors editorial posts from the Seesturm REST API into a local document
//! store. The store side is an insert-or-merge engine with content-equality
//! checks and store-assigned timestamps (`upsert`); the fetch side is a
//! paged-list state machine that keeps already-loaded items across transient
//! failures (`page`).

pub mod config;
pub mod model;
pub mod page;
pub mod store;
pub mod sync;
pub mod upsert;
pub mod wordpress;
