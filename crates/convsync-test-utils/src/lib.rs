// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for convsync integration tests.
//!
//! Provides mock adapters and raw-record builders for fast, deterministic,
//! CI-runnable tests without a live backend or realtime service.
//!
//! # Components
//!
//! - [`MockBackend`] - scripted REST backend that records every call
//! - [`MockTransport`] - push transport with injectable change events
//! - [`records`] - builders for wire-shaped rows and change events

pub mod mock_backend;
pub mod mock_transport;
pub mod records;

pub use mock_backend::{BackendCall, MockBackend};
pub use mock_transport::MockTransport;
