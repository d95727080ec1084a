//! Client orchestration for the corporate-card expenses backend.
//!
//! Everything a front-end needs lives here: the REST client, the local
//! key-value cache, the session service, month paging, budget math and the
//! push-notification highlight flow. The `gastos` binary is one such
//! front-end.

pub mod commands;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;
