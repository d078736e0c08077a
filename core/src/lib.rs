//! Core components for talking to multi-service cloud control planes.
//!
//! This crate provides the request pipeline the `cloudreq` facade builds on.
//! It keeps the moving parts of a control-plane call (description, header
//! merging, the handler chain, signing, sending) explicit and separately
//! testable.
//!
//! ## Overview
//!
//! The crate is built around a few key pieces:
//!
//! - **[`RequestOptions`]**: a loosely specified call descriptor, checked and
//!   frozen into a [`NormalizedRequest`] before anything else runs
//! - **[`HandlerChain`]**: five ordered stages of synchronous handlers every
//!   outgoing request passes through
//! - **[`RequestSigner`]**: derives an `Authorization` header from a
//!   [`Credentials`] pair over the canonical form of the request
//! - **[`HttpClient`]**: merges headers, applies the chain, resolves the URL
//!   and hands off to an [`HttpSend`] transport
//! - **[`Pager`]** and **[`poller`]**: lazy list pagination and wait
//!   primitives for eventually consistent resources
//!
//! ## Example
//!
//! ```no_run
//! use cloudreq_core::{
//!     ClientConfig, Credentials, HttpClient, HttpSend, RequestOptions, RequestSigner,
//!     SigningScheme, Stage,
//! };
//!
//! # async fn example(transport: impl HttpSend) -> cloudreq_core::Result<()> {
//! let client = HttpClient::new(
//!     ClientConfig::new().with_base_url("https://iam.eu-de.example.com"),
//!     transport,
//! );
//!
//! let credentials = Credentials::new("access-key", "secret-key").with_region("eu-de");
//! client.configure(
//!     Stage::Signing,
//!     RequestSigner::new(SigningScheme::Sdk).into_handler(credentials),
//! )?;
//!
//! let resp = client
//!     .get(RequestOptions::new().with_url("/v3/projects").with_param("name", "prod"))
//!     .await?;
//! println!("{}", resp.data);
//! # Ok(())
//! # }
//! ```
//!
//! ## Utilities
//!
//! The crate also provides utility modules:
//!
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time formatting utilities
//! - [`utils`]: General utilities including data redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod error;
pub use error::{Error, ErrorKind, Result};
mod headers;
pub use headers::Scalar;
mod options;
pub use options::{is_absolute_url, join_url, NormalizedRequest, RequestOptions};
mod chain;
pub use chain::{handler_fn, Handler, HandlerChain, Stage};
mod sign;
pub use sign::{Credentials, RequestSigner, SigningScheme};
mod http;
pub use http::{HttpSend, NoopHttpSend, SentRequest, StaticHttpSend};
mod client;
pub use client::{ClientConfig, HttpClient, HttpResponse};
mod pager;
pub use pager::{Page, Pager};
pub mod poller;
