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

//! Cloud storage abstraction layer
//!
//! Read-only access to the files of an Iceberg table, wherever they live
//! (AWS S3, Azure Data Lake, GCS, local filesystem, or an in-memory store).
//!
//! Every backend goes through the `object_store` crate; [`StorageConfig`]
//! carries the backend type plus string options for its builder.

pub mod config;
pub mod error;
pub mod factory;
pub mod object_store;
pub mod provider;

// Public exports
pub use config::{StorageConfig, StorageType};
pub use factory::StorageProviderFactory;
pub use error::{StorageError, StorageResult};
pub use self::object_store::ObjectStoreProvider;
pub use provider::{FileMetadata, StorageProvider};
