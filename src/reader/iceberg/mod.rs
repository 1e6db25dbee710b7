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

//! Apache Iceberg metadata tree reader (format versions 1 and 2).

pub mod location;
pub mod manifest;
pub mod metadata;
pub mod reader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use manifest::{
    DataContent, DataFileEntry, EntryStatus, ManifestArena, ManifestContent, ManifestId,
    ManifestListEntry, PartitionKey, PartitionValue,
};
pub use metadata::{FormatVersion, Operation, Snapshot, TableMetadata};
pub use reader::{LoadedTable, MetadataReader, RetainedManifests};
