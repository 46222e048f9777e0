//! Source-of-truth cutover and reconciliation engine.
//!
//! Moves tables from a legacy store to a new store one at a time. The
//! library exposes the engine, its persistence layer and the HTTP surface
//! used by the operator tool.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
