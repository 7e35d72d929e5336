//! # koala-user
//!
//! User account service core: a write-behind task pipeline that applies
//! store mutations and publishes change events off the request path.
//!
//! Request handling validates input and submits [`pipeline::Task`]s to a
//! fixed-size [`pipeline::WorkerPool`]. Failed tasks land in a
//! [`pipeline::RecoveryStore`] and are re-submitted by the
//! [`pipeline::RetrySweeper`]. Events go out through a
//! [`broker::TransactionalPublisher`] that drives the producer's
//! begin/commit/abort protocol.

pub mod broker;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod telemetry;
