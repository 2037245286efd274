// SPDX-License-Identifier: GPL-3.0-or-later

//! Generic adapter for *arr-style v3 REST APIs.
//!
//! One client and one adapter cover every supported service: the resource
//! endpoints differ only in path, and the wire shapes are the resource
//! model itself (camelCase JSON with unknown fields passed through).

pub mod adapter;
pub mod client;
pub mod error;
pub mod models;

pub use adapter::ArrAdapter;
pub use client::{ArrClient, ArrClientBuilder};
pub use error::{ArrError, Result};
