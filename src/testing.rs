//! Centralized test fixtures and helpers.
//!
//! This module provides shared test utilities to avoid duplication across
//! test modules.
