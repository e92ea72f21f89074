//! Core types for the vnode virtual node.
//!
//! This crate provides the foundation the provider builds on:
//!
//! - **Resource aggregate**: [`Resources`], the multi-dimensional schedulable
//!   capacity summed across real cluster nodes
//! - **Quantity handling**: parsing and formatting of Kubernetes quantity
//!   strings in the canonical units used on the node capacity boundary
//!   (CPU in milli-cores, memory and storage in bytes)
//! - **Error types**: the aggregate error taxonomy shared across crates
//!
//! # Example
//!
//! ```
//! use vnode_core::Resources;
//! use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
//! use std::collections::BTreeMap;
//!
//! let mut capacity = BTreeMap::new();
//! capacity.insert("cpu".to_string(), Quantity("2".to_string()));
//! capacity.insert("memory".to_string(), Quantity("2Gi".to_string()));
//!
//! let mut total = Resources::default();
//! let node = Resources::from_capacity(&capacity).unwrap();
//! total.add(&node).unwrap();
//!
//! assert_eq!(total.cpu_millis, 2000);
//! assert_eq!(total.memory_bytes, 2 * 1024 * 1024 * 1024);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod quantity;
pub mod resources;

pub use error::{CoreError, Result};
pub use resources::Resources;
