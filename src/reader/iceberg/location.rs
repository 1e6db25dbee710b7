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

//! Resolution of file references found inside table metadata.

use url::Url;

/// Whether `reference` already names a file on its own (URI or absolute path).
pub fn is_absolute(reference: &str) -> bool {
    reference.contains("://") || reference.starts_with('/') || reference.starts_with("file:")
}

/// Directory part of a location, without the trailing slash.
pub fn parent_dir(location: &str) -> &str {
    let (prefix, path) = split_authority(location);
    match path.rfind('/') {
        Some(idx) => &location[..prefix.len() + idx],
        None => prefix,
    }
}

/// Resolve a manifest list or manifest reference found in the root metadata
/// document at `root_location`.
///
/// Absolute references are returned unchanged. Relative ones are joined to
/// the directory holding the root document and `.` / `..` segments are
/// collapsed: with URL rules when the root is a URI, textually for plain
/// and store-relative paths.
pub fn resolve_reference(root_location: &str, reference: &str) -> String {
    if is_absolute(reference) {
        return reference.to_string();
    }
    if let Ok(joined) = Url::parse(root_location).and_then(|root| root.join(reference)) {
        if !joined.cannot_be_a_base() {
            return joined.to_string();
        }
    }
    let joined = format!("{}/{}", parent_dir(root_location), reference);
    let (prefix, path) = split_authority(&joined);
    format!("{}{}", prefix, normalize_path(path))
}

/// Split `scheme://authority` from the path that follows it.
fn split_authority(location: &str) -> (&str, &str) {
    if let Some(idx) = location.find("://") {
        let after = idx + 3;
        let end = location[after..]
            .find('/')
            .map(|p| after + p)
            .unwrap_or(location.len());
        (&location[..end], &location[end..])
    } else if let Some(rest) = location.strip_prefix("file:") {
        (&location[..location.len() - rest.len()], rest)
    } else {
        ("", location)
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let joined = segments.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(
            parent_dir("s3://lake/db/t/metadata/v3.metadata.json"),
            "s3://lake/db/t/metadata"
        );
        assert_eq!(parent_dir("/tmp/t/metadata/v1.metadata.json"), "/tmp/t/metadata");
        assert_eq!(parent_dir("v1.metadata.json"), "");
        assert_eq!(parent_dir("s3://lake"), "s3://lake");
    }

    #[test]
    fn test_absolute_reference_unchanged() {
        let root = "s3://lake/t/metadata/v1.metadata.json";
        assert_eq!(
            resolve_reference(root, "s3://other/t/metadata/snap-1.avro"),
            "s3://other/t/metadata/snap-1.avro"
        );
        assert_eq!(resolve_reference(root, "/abs/snap-1.avro"), "/abs/snap-1.avro");
        assert_eq!(
            resolve_reference(root, "file:/tmp/snap-1.avro"),
            "file:/tmp/snap-1.avro"
        );
    }

    #[test]
    fn test_relative_reference_resolved_against_root_dir() {
        let root = "s3://lake/db/t/metadata/v2.metadata.json";
        assert_eq!(
            resolve_reference(root, "snap-9-1-abc.avro"),
            "s3://lake/db/t/metadata/snap-9-1-abc.avro"
        );
        assert_eq!(
            resolve_reference(root, "./sub/../m0.avro"),
            "s3://lake/db/t/metadata/m0.avro"
        );
        assert_eq!(
            resolve_reference(root, "../data/x.parquet"),
            "s3://lake/db/t/data/x.parquet"
        );
    }

    #[test]
    fn test_relative_reference_local_and_file_uri() {
        assert_eq!(
            resolve_reference("/wh/t/metadata/v1.metadata.json", "../metadata/m.avro"),
            "/wh/t/metadata/m.avro"
        );
        assert_eq!(
            resolve_reference("file:///wh/t/metadata/v1.metadata.json", "m.avro"),
            "file:///wh/t/metadata/m.avro"
        );
        assert_eq!(
            resolve_reference("t/metadata/v1.metadata.json", "m.avro"),
            "t/metadata/m.avro"
        );
    }

    #[test]
    fn test_relative_reference_memory_uri() {
        assert_eq!(
            resolve_reference("memory:///wh/t/metadata/v1.metadata.json", "./a/../snap-1.avro"),
            "memory:///wh/t/metadata/snap-1.avro"
        );
        assert_eq!(
            resolve_reference("s3://lake:9000/t/metadata/v1.metadata.json", "m.avro"),
            "s3://lake:9000/t/metadata/m.avro"
        );
    }

    #[test]
    fn test_parent_segments_do_not_escape_authority() {
        assert_eq!(
            resolve_reference("s3://lake/t/v1.metadata.json", "../../../m.avro"),
            "s3://lake/m.avro"
        );
    }
}
