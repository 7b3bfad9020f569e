//! Shared helpers for end-to-end tests.

#[path = "helpers/fake_service.rs"]
pub mod fake_service;
