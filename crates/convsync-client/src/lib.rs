// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network adapters for convsync.
//!
//! [`RestBackend`] implements `MessageBackend` over the support dashboard's
//! REST API; [`RealtimeTransport`] implements `PushTransport` over a
//! Phoenix-channel websocket delivering row changes.

pub mod frame;
pub mod realtime;
pub mod rest;

pub use realtime::{RealtimeSettings, RealtimeTransport};
pub use rest::RestBackend;
