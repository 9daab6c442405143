//! Souq storefront library.
//!
//! Cart, checkout and order tracking for the Souq storefront, plus the thin
//! JSON HTTP surface the `souq-storefront` binary serves. Everything the
//! binary wires together is exposed here so it can be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod routes;
pub mod services;
pub mod state;
