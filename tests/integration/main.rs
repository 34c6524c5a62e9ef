//! Integration tests for the enrichment pipeline
//!
//! These tests drive whole jobs through the public API with a scripted
//! browser and in-memory queue, store and bus backends.

mod enrich_tests;
mod support;
