//! Reference backend for the board.
//!
//! A small appointments service the board can run against: services, clients
//! and appointments in SQLite, a JSON HTTP API under `/api/v1`, and a `/ws`
//! socket that pushes a [`LiveMessage`](slotboard_common::LiveMessage) after
//! every mutation.
//!
//! | Module   | Responsibility                                         |
//! |----------|--------------------------------------------------------|
//! | `db`     | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)    |
//! | `api`    | Route handlers, `AppState`, error → HTTP mapping       |
//! | `ws`     | Socket loop with ping/pong + `broadcast_message()`     |
//! | `server` | Router assembly, binding, graceful shutdown            |

pub mod api;
pub mod db;
pub mod server;
pub mod ws;

pub use server::{BoardServer, ServerConfig, build_router, shutdown_signal};
