// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types shared by every fairscore crate

use thiserror::Error;

/// Errors raised while loading configuration or validating caller input
#[derive(Debug, Error)]
pub enum FairError {
    /// Malformed keyword/regex table or weight map. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied unusable input (mismatched lengths, empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for FairError {
    fn from(err: toml::de::Error) -> Self {
        FairError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FairError>;
