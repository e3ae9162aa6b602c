//! `butler-server` – HTTP front door of the relay.
//!
//! A thin transport shell around [`PlanRelay`][butler_runtime::PlanRelay]:
//!
//! 1. **Ingests** camera frames at `POST /upload/:robot_id` after checking the
//!    content type (JPEG/PNG) and size (≤ 1.5 MB), then stores them.
//! 2. **Answers** planning polls at `POST /brain/:robot_id` with a validated
//!    command list.  This route always returns `200`; oracle trouble is
//!    reported in the body's `error` field.
//! 3. **Gates** both routes on the shared-secret `x-api-key` header when a
//!    proxy key is configured.
//!
//! `GET /health` lists robots with a stored frame.

pub mod routes;
pub mod server;

pub use routes::{API_KEY_HEADER, AppState, DEFAULT_MAX_UPLOAD_BYTES, router};
pub use server::{DEFAULT_PORT, RelayServer};
