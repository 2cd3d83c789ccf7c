// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core pipeline logic for interop metrics collection.
//!
//! The pipeline aggregates per-browser test run results into cross-browser
//! interoperability metrics and publishes them to two independently-failing
//! storage backends. The flow is: idempotency gate, concurrent result
//! loading (sharded per-object enumeration or consolidated single-document
//! fetch), consolidation into a per-test status index, parallel metric
//! computation, and parallel publication across sinks and metric sets.

pub mod cache;
pub mod compute;
pub mod consolidate;
pub mod errors;
pub mod gate;
pub mod limiter;
pub mod loader;
pub mod pipeline;
pub mod publish;
pub mod stores;
