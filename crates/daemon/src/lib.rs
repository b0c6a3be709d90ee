// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fray-daemon: configuration and logging setup shared between the `frayd`
//! binary and its tests.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError};
pub use logging::setup_logging;
