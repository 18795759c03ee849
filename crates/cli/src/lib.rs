// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod broker;
pub mod browser;
pub mod command;
pub mod config;
pub mod error;
pub mod flow;
pub mod materialize;
pub mod probe;
pub mod run;
pub mod target;
pub mod test_support;
pub mod token;
