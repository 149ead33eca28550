//! porfavor - host generated documentation for many projects
//!
//! One process runs two servers over a shared work directory, where every
//! immediate subdirectory is a project:
//!
//! - **Web front end** (HTTP, default port 5000): read-only. Lists projects
//!   and serves their files.
//! - **Publish endpoint** (TCP, default port 12341): the only writer.
//!   Accepts a project name and a set of `(relative path, bytes)` pairs and
//!   writes them under the project directory.
//!
//! # HTTP Endpoints
//!
//! - `GET /` - HTML index of projects
//! - `GET /api/get_projects` - `{"<project>": {"icon": "<abs path>" | null}}`
//! - `GET /static/{*path}` - bundled UI assets
//! - `GET /projects/{*path}` - project files; 401 when the path escapes
//!   the work directory
//!
//! # Publishing
//!
//! ```rust,no_run
//! use porfavor::publish::{ProjectDoc, PublishClient};
//!
//! # async fn example() -> Result<(), porfavor::ClientError> {
//! let mut client = PublishClient::connect("127.0.0.1:12341").await?;
//! client
//!     .publish("demo", vec![ProjectDoc::new("index.html", "<p>hi</p>")])
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The library without the `server` feature keeps the publish client, the
//! wire protocol and the work-directory guard.

pub mod error;
pub mod publish;
pub mod workdir;

#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod middleware;
#[cfg(feature = "server")]
pub mod routes;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub mod state;
#[cfg(feature = "server")]
pub mod ui;

pub use error::{ClientError, PublishError, WorkDirError};
pub use publish::{DiskPublisher, ProjectDoc, Publish, PublishClient, PublishRequest, PublishServer};
pub use workdir::{ProjectInfo, WorkDir};

#[cfg(feature = "server")]
pub use config::{ConfigOverrides, ServerConfig};
#[cfg(feature = "server")]
pub use error::{ServerError, ServerResult};
#[cfg(feature = "server")]
pub use server::{Servers, build_router, start_server};
#[cfg(feature = "server")]
pub use state::ServerState;
