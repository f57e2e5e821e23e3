//! HTTP transport for origin request policy reconciliation.
//!
//! [`HttpPolicyApi`] implements [`orp_core::PolicyApi`] against a JSON REST
//! surface shaped like the CloudFront origin request policy API. Request
//! signing and credentials are expected to be handled by an egress proxy in
//! front of the configured endpoint.
//!
//! ```no_run
//! use orp_cloudfront::{CloudFrontConfig, HttpPolicyApi};
//! use orp_core::Reconciler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CloudFrontConfig::with_endpoint("http://127.0.0.1:9000/2020-05-31");
//! let api = HttpPolicyApi::new(&config)?;
//! let reconciler = Reconciler::new(api);
//! # let _ = reconciler;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;

pub use client::{HttpPolicyApi, PolicyBody};
pub use config::{CloudFrontConfig, DEFAULT_ENDPOINT};
pub use error::{CloudFrontError, CloudFrontResult};
