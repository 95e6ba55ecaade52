// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics: structured logging, transfer tracing and stack accounting.

#[macro_use]
pub mod log;

#[cfg(feature = "heapinfo")]
pub mod heapinfo;
pub mod trace;
