//! Session-aware client for the SAP Commerce Administration Console (HAC).
//!
//! ```no_run
//! # async fn run() -> hac_client::HacResult<()> {
//! use hac_client::{AuthHandler, ClientOptions, HacClient, SessionStore};
//!
//! let store = SessionStore::file("/tmp/hac-sessions").await;
//! let client = HacClient::new(
//!     ClientOptions::new("https://localhost:9002"),
//!     AuthHandler::basic("admin", "nimda"),
//!     Some(store),
//! )?;
//! let result = client.execute_groovy("println 'hello'", false).await?;
//! println!("{}", result.output_text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod hac;
pub mod store;

pub use error::{HacError, HacResult};
pub use hac::auth::{AuthHandler, BasicAuth};
pub use hac::client::{ClientOptions, HacClient};
pub use hac::models;
pub use store::{SessionKey, SessionMetadata, SessionStore};
