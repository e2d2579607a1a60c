//! Tests for the ingest pipeline.

mod helpers;
