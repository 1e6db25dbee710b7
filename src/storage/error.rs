// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use std::io::ErrorKind;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Access denied: {path}")]
    AccessDenied { path: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(object_store::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound { path },
            object_store::Error::PermissionDenied { path, .. }
            | object_store::Error::Unauthenticated { path, .. } => {
                StorageError::AccessDenied { path }
            }
            other => StorageError::ObjectStoreError(other),
        }
    }
}

impl StorageError {
    /// Whether the failure is a transient connection problem worth retrying.
    ///
    /// Not-found, access-denied and configuration errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ConnectionError(_) => true,
            StorageError::IoError(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::Interrupted
                    | ErrorKind::TimedOut
            ),
            StorageError::ObjectStoreError(e) => {
                let msg = format!("{:?}", e);
                msg.contains("ConnectionReset")
                    || msg.contains("BrokenPipe")
                    || msg.contains("Interrupted")
                    || msg.contains("TimedOut")
            }
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
