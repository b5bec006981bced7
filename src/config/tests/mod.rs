//! Unit tests for fixtainer configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and TOML parsing
//! - [`validation`] - `StartupConfig` validation and conversion
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests
