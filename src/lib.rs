//! # Cube Catalog
//!
//! A personal-collection catalog service: one JSON document holds the
//! ordered list of catalog records ("cubes"), and a per-record directory tree
//! holds their uploaded images and PDF solution documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │   HTTP   │──▶│ RecordStore  │──▶│ data/cubes.json      │
//! │  (axum)  │   └──────┬───────┘   └──────────────────────┘
//! │          │          │ delete
//! │          │   ┌──────▼───────┐   ┌──────────────────────┐
//! │          │──▶│  AssetDirs   │──▶│ public/cubes/cube-N/ │
//! └──────────┘   └──────────────┘   │   images/ solutions/ │
//!                                   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cubes init                    # create the store document and asset root
//! cubes serve                   # start the HTTP API
//! cubes list                    # print the catalog
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Canonical record schema and field validation |
//! | [`normalize`] | Migration of legacy record shapes |
//! | [`store`] | Whole-document record store |
//! | [`assets`] | Asset naming and per-record directories |
//! | [`upload`] | Multipart upload validation and storage |
//! | [`auth`] | Admin login and bearer tokens |
//! | [`server`] | HTTP API |
//! | [`error`] | Error taxonomy |

pub mod assets;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod server;
pub mod store;
pub mod upload;
