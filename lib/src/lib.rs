// Copyright 2024 The gitdup Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Duplicates a range of commits onto a new root with an identical tree,
//! without running any merge.
//!
//! The pieces are wired together in this order: [`history`] reads the range
//! from a [`backend::Backend`], [`sequencer`] puts it in parents-first order,
//! and [`duplicate`] writes one new commit per original and reports the new
//! tip.

#![warn(missing_docs)]
#![deny(unused_must_use)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod commit;
pub mod dag_walk;
pub mod duplicate;
#[cfg(feature = "git")]
pub mod git_backend;
pub mod history;
pub mod object_id;
pub mod sequencer;
pub mod settings;
pub mod verify;
