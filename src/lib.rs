#![deny(missing_docs)]
//! An FTP(S) server library for Rust
//!
//! quayftp is a safe, async FTP server implementation with pluggable
//! authentication and storage back-ends. The core speaks RFC 959 with the
//! RFC 2228 security extensions (`AUTH TLS`, `PBSZ`, `PROT`), RFC 2389
//! (`FEAT`/`OPTS`) and the IPv4 part of RFC 2428 (`EPRT`/`EPSV`).
//!
//! # Quick Start
//!
//! ```no_run
//! let server = quayftp::Server::with_fs_root(std::env::temp_dir())
//!     .greeting("Welcome to my FTP server")
//!     .passive_ports(50000..=50099);
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(server.listen("127.0.0.1:2121")).unwrap();
//! ```

pub mod auth;
pub mod notification;
pub(crate) mod server;
pub mod storage;

pub use crate::server::ftpserver::{options, Server};
