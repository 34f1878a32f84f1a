// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`crewlink-core`)
//!
//! HTTP and WebSocket surface that translates external requests into
//! registry and bus calls. No business logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP/SSE (Axum) | Registry endpoints, remote bus publish and subscribe |
//! | [`channel`] | WebSocket (Axum) | Per-agent heartbeat and command channel |
//! | [`error`] | HTTP | `FabricError` to status code and JSON body, rejection-mapping extractors |

pub mod api;
pub mod channel;
pub mod error;

pub use api::{protect, router, FabricState, API_KEY_HEADER};
pub use error::{ApiError, ApiJson, ApiQuery, ApiResult};
