// SPDX-FileCopyrightText: © 2022-2024 The gitdup Authors
// SPDX-License-Identifier: Apache-2.0

#![deny(unused_must_use)]

pub mod cli_util;
pub mod command_error;
pub mod commands;
pub mod config;
mod progress;
pub mod ui;
