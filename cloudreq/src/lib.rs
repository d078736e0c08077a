#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub use cloudreq_core::*;

mod client;
pub use client::{CloudClient, ServiceBinding, ServiceKey, USER_AGENT_VALUE};

mod config;
pub use config::{AuthOptions, CloudConfig, DEFAULT_REGION};

pub mod identity;
