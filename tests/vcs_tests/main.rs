//! Tests for version control drivers and the sync coordinator
//!
//! These tests verify:
//! - Commit/push sequencing and the resulting commit states
//! - Failure counting and degraded state
//! - The git subprocess driver (skipped when git is unavailable)
