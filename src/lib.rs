//! # Megalite - encrypted cloud storage client core
//!
//! Client core for a cloud storage service whose defining feature is
//! end-to-end encryption: the server stores ciphertext only, and all
//! cryptographic state is derived, unwrapped and verified on the client.
//!
//! ## Features
//!
//! - **Password-derived keys**: login keys stretched from the password,
//!   per-node keys unwrapped from the server manifest
//! - **Encrypted filesystem mirror**: owned, shared-root and shared-descendant
//!   nodes reconstructed into a local node graph
//! - **Authenticated chunked transfers**: parallel workers streaming AES-CTR
//!   chunks while a chained CBC MAC authenticates the whole file
//! - **Resilient request layer**: sequenced API calls with retry on transient
//!   failures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use megalite::{libs::config::Config, Mega};
//!
//! # async fn example() -> megalite::libs::error::Result<()> {
//! let mut mega = Mega::new(Config::default())?;
//! mega.login("user@example.com", "password").await?;
//! mega.refresh().await?;
//! let root = mega.root().unwrap().to_string();
//! mega.upload_file("report.pdf".as_ref(), &root, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod crypto;
pub mod fs;
pub mod libs;
pub mod transfer;

// Re-export the types callers touch on every interaction
pub use client::Mega;
pub use fs::node::{Node, NodeKind, NodeMeta};
pub use libs::config::Config;
pub use libs::error::{Error, Result};
