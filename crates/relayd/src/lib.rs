//! Relay Daemon - Peer registry and broadcast server
//!
//! This crate provides the core infrastructure for the relay daemon:
//! - `registry` - Shared set of connected peers
//! - `broadcast` - Fan-out of one line to every registered peer
//! - `server` - TCP accept loop and per-connection handlers
//! - `config` - Runtime configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        relayd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  RelayServer    │────▶│     PeerRegistry            │   │
//! │  │ (TcpListener)   │     │  (Mutex<Vec<Peer>>)         │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │ snapshot/remove   │
//! │           │ connections                 │                   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ConnectionHandler│────▶│   Broadcaster               │   │
//! │  │  (per client)   │     │   (writes every Outbound)   │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows a panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-connection failures end that connection, never the process

pub mod broadcast;
pub mod config;
pub mod registry;
pub mod server;
