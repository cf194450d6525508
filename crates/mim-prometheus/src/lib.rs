//! Prometheus metrics backend for the machine image allocator.
//!
//! This crate provides a [`PrometheusMetrics`] implementation of [`mim_core::MetricsBackend`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mim_core::ImageAllocator;
//! use mim_model::{Device, Label};
//! use mim_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let mut allocator = ImageAllocator::new(vec![Label::new("image")], vec![Device::new("dut-1")])
//!     .with_metrics(Arc::new(metrics.clone()));
//! allocator.initialize()?;
//!
//! let mut buffer = Vec::new();
//! TextEncoder::new().encode(&metrics.gather(), &mut buffer)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `mim_initial_allocations_total{outcome}` - Counter
//! - `mim_reimage_bound` - Gauge
//! - `mim_initial_allocation_duration_seconds` - Histogram
//! - `mim_allocations_total{label, source}` - Counter
//! - `mim_devices_exhausted_total{device}` - Counter
//!
//! ## HTTP Server
//! This crate does NOT provide an HTTP server for a `/metrics` endpoint.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
