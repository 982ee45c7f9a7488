//! # Repo Index
//!
//! Keeps an incrementally updated vector index of a GitHub repository's
//! open issues and pull requests.
//!
//! Each sync fetches a small batch of items from the GitHub GraphQL API,
//! embeds only what changed, and writes one compressed vector object per
//! repository to a blob store. Repository records (status, last sync,
//! last error) live in SQLite. The engine itself is in
//! [`repo_index_core`]; this crate supplies its backends, a CLI, and an
//! HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  GitHub  │──▶│  SyncEngine  │──▶│ Blob store       │
//! │ GraphQL  │   │ plan + merge │   │ fs / S3 / R2     │
//! └──────────┘   └──────┬───────┘   └──────────────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        ▼              ▼              ▼
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │ Embedder │   │  SQLite  │   │ CLI/HTTP │
//!  └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rix init                                  # create database
//! rix add https://github.com/acme/widget    # register a repository
//! GITHUB_TOKEN=... rix sync acme/widget     # run one sync
//! rix inspect acme/widget                   # look at the stored index
//! rix serve                                 # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`repositories`] | SQLite repository metadata store |
//! | [`blob_fs`] | Filesystem blob store |
//! | [`blob_s3`] | S3-compatible blob store |
//! | [`github`] | GitHub GraphQL client |
//! | [`github_url`] | Repository URL parsing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`service`] | Engine wiring |
//! | [`commands`] | CLI commands |
//! | [`server`] | HTTP API |

pub mod blob_fs;
pub mod blob_s3;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod github;
pub mod github_url;
pub mod migrate;
pub mod repositories;
pub mod server;
pub mod service;
