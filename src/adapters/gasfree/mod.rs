//! GasFree fee relay adapter

pub mod client;

pub use client::{sign_request, GasFreeClient, GasFreeConfig};
