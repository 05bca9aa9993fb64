// Copyright 2020 The gitdup Authors
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

#![allow(missing_docs)]

use chrono::DateTime;
use thiserror::Error;

use crate::backend::{Signature, Timestamp};

/// Settings of the user running the duplication, i.e. whoever ends up as the
/// committer of the new commits.
#[derive(Debug, Clone)]
pub struct UserSettings {
    config: config::Config,
    timestamp: Option<Timestamp>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid `user.timestamp` {value:?}, expected an RFC 3339 date")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl UserSettings {
    pub fn from_config(config: config::Config) -> Result<Self, SettingsError> {
        let timestamp = get_timestamp_config(&config, "user.timestamp")?;
        Ok(UserSettings { config, timestamp })
    }

    pub fn user_name(&self) -> String {
        self.config
            .get_string("user.name")
            .unwrap_or_else(|_| "(no name configured)".to_string())
    }

    pub fn user_email(&self) -> String {
        self.config
            .get_string("user.email")
            .unwrap_or_else(|_| "(no email configured)".to_string())
    }

    /// The committer time of new commits. Fixed by `user.timestamp` if set,
    /// otherwise the current time.
    pub fn committer_timestamp(&self) -> Timestamp {
        self.timestamp.unwrap_or_else(Timestamp::now)
    }

    pub fn committer_signature(&self) -> Signature {
        Signature {
            name: self.user_name().into(),
            email: self.user_email().into(),
            timestamp: self.committer_timestamp(),
        }
    }

    pub fn progress_indicator(&self) -> bool {
        self.config
            .get_bool("ui.progress-indicator")
            .unwrap_or(true)
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }
}

fn get_timestamp_config(
    config: &config::Config,
    key: &str,
) -> Result<Option<Timestamp>, SettingsError> {
    let Ok(value) = config.get_string(key) else {
        return Ok(None);
    };
    let datetime = DateTime::parse_from_rfc3339(&value)
        .map_err(|source| SettingsError::InvalidTimestamp { value, source })?;
    Ok(Some(Timestamp::from_datetime(datetime)))
}
