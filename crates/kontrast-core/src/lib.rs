// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kontrast core: types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod params;
pub mod types;

pub use config::AppConfig;
pub use error::KontrastError;
pub use params::{ParamValue, ParameterBag};
pub use types::*;
