//! sqlgate - Unified SQL Gateway
//!
//! Serves a local or remote SQL database to a browser-based query studio.
//! One driver abstraction covers embedded SQLite files, managed libsql/Turso
//! databases, and client/server MySQL or PostgreSQL engines; a small HTTP
//! proxy maps the studio's JSON commands onto that abstraction.
//!
//! # Architecture
//!
//! - **Driver**: backend adapters normalizing execution and result metadata
//! - **Config**: JSON config file with one tagged variant per backend
//! - **Resolver**: config or connection string → concrete driver
//! - **Server**: Axum proxy translating editor commands into driver calls
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlgate::{resolver, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let driver = resolver::from_connection_string("data.db")?;
//!     server::serve(
//!         Arc::from(driver),
//!         server::ServeOptions {
//!             port: 4000,
//!             studio: "https://libsqlstudio.com/embed".to_string(),
//!             username: None,
//!             password: None,
//!             log: false,
//!         },
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod resolver;
pub mod server;

pub use config::{ConnectionConfig, GatewayConfig};
pub use driver::{Driver, DriverError, DriverKind, QueryResult};
pub use resolver::ResolveError;
pub use server::{AppState, ServeOptions, create_router, serve};
