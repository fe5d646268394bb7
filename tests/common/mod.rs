//! Common test utilities for facade integration tests
//!
//! Provides a small deterministic engine so the in-process and JSON-RPC
//! bindings can be exercised end to end without a real command engine.

pub mod scripted_engine;

pub use scripted_engine::ScriptedEngine;
