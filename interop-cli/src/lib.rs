// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `interop-metrics` command-line interface.

mod dispatch;
mod errors;

pub use dispatch::InteropMetricsApp;
pub use errors::ExpectedError;
