// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the convsync workspace.

use thiserror::Error;

/// The primary error type used across all convsync adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ConvsyncError {
    /// Configuration errors (invalid TOML, missing required fields, bad URLs).
    #[error("configuration error: {0}")]
    Config(String),

    /// REST backend errors (connection failure, non-2xx status, `success: false`).
    #[error("http error: {message}")]
    Http {
        message: String,
        /// HTTP status code, when the server answered at all.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A response or push frame could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Push transport errors (websocket connect, join rejected, socket closed).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The conversation session was closed before the operation could complete.
    #[error("conversation session is closed")]
    SessionClosed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvsyncError {
    /// Builds an [`ConvsyncError::Http`] from a reqwest-style failure message.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
            source: None,
        }
    }

    /// Builds a [`ConvsyncError::Transport`] without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }
}
