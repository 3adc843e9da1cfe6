//! Infrastructure layer: configuration, persistence, blob storage, mail and
//! the application services built on top of them.

pub mod blob;
pub mod config;
pub mod mail;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;
