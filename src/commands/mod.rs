// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! CLI command implementations

mod check;
mod status;
mod sync;

pub use check::check;
pub use status::{list_resources, status};
pub use sync::{sync_once, watch};
