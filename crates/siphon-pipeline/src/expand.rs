//! Zip container expansion.
//!
//! A fetched `.zip` file is expanded into a sibling `extracted_{stem}`
//! directory. Nested member paths collapse to their sanitized base name, so
//! the extraction directory is always flat; when two members share a name
//! the later entry wins. Each extracted file keeps the modification time
//! recorded in the archive. The container file itself is always removed,
//! whether expansion succeeds or fails.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use siphon_core::{file_type_of, sanitize_file_name};
use thiserror::Error;

/// Expansion errors
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("Archive error in {path}: {message}")]
    Archive { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file produced by expanding a container.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub local_path: PathBuf,
    /// Sanitized base name, identical to the last component of `local_path`.
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    pub modified_unix: i64,
}

/// File types treated as expandable containers.
const CONTAINER_TYPES: &[&str] = &["zip"];

pub fn is_container(file_type: &str) -> bool {
    CONTAINER_TYPES.contains(&file_type)
}

/// Directory a container expands into: `extracted_{stem}` next to the
/// staging root.
pub fn extraction_dir(container_path: &Path, staging_root: &Path) -> PathBuf {
    let stem = container_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    staging_root.join(format!("extracted_{stem}"))
}

/// Expand a zip container into its extraction directory and return the
/// extracted members. The container file is removed regardless of outcome.
pub fn expand_container(
    container_path: &Path,
    staging_root: &Path,
) -> Result<Vec<ArchiveMember>, ExpandError> {
    let dest = extraction_dir(container_path, staging_root);
    let result = extract_members(container_path, &dest);

    if let Err(e) = std::fs::remove_file(container_path) {
        tracing::warn!(
            path = %container_path.display(),
            error = %e,
            "Failed to remove container after expansion"
        );
    }

    result
}

fn extract_members(
    container_path: &Path,
    dest: &Path,
) -> Result<Vec<ArchiveMember>, ExpandError> {
    let archive_err = |e: zip::result::ZipError| ExpandError::Archive {
        path: container_path.display().to_string(),
        message: e.to_string(),
    };

    std::fs::create_dir_all(dest)?;

    let file = std::fs::File::open(container_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;

    // Keyed by final name so a later same-named entry replaces the earlier
    // one, matching the overwrite on disk.
    let mut members: BTreeMap<String, ArchiveMember> = BTreeMap::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_err)?;
        if entry.is_dir() {
            continue;
        }

        let base_name = Path::new(entry.name())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = sanitize_file_name(&base_name);
        if file_name.is_empty() {
            tracing::warn!(
                archive = %container_path.display(),
                entry = %entry.name(),
                "Skipping archive entry with unusable name"
            );
            continue;
        }

        let modified_unix = zip_datetime_unix(entry.last_modified());
        let local_path = dest.join(&file_name);

        let mut out = std::fs::File::create(&local_path)?;
        let size = std::io::copy(&mut entry, &mut out)?;
        drop(out);

        filetime::set_file_mtime(&local_path, FileTime::from_unix_time(modified_unix, 0))?;

        members.insert(
            file_name.clone(),
            ArchiveMember {
                local_path,
                file_type: file_type_of(&file_name),
                file_name,
                size,
                modified_unix,
            },
        );
    }

    tracing::info!(
        archive = %container_path.display(),
        dest = %dest.display(),
        members = members.len(),
        "Container expanded"
    );

    Ok(members.into_values().collect())
}

/// Zip stores MS-DOS timestamps; convert to seconds since the epoch,
/// treating the stored wall time as UTC. Unrepresentable dates become 0.
fn zip_datetime_unix(dt: zip::DateTime) -> i64 {
    chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)
        .and_then(|date| {
            date.and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        })
        .map(|naive| naive.and_utc().timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        use zip::write::{FileOptions, ZipWriter};

        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        // DOS timestamps have 2-second resolution, keep seconds even.
        let timestamp = zip::DateTime::from_date_and_time(2024, 3, 15, 10, 30, 20).unwrap();
        let options = FileOptions::default().last_modified_time(timestamp);

        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn only_zip_is_a_container() {
        assert!(is_container("zip"));
        assert!(!is_container("csv"));
        assert!(!is_container("tar"));
        assert!(!is_container("none"));
    }

    #[test]
    fn expand_flattens_nested_members() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("bundle.zip");
        write_zip(
            &container,
            &[
                ("top.csv", b"a,b\n" as &[u8]),
                ("nested/dir/deep.txt", b"deep"),
            ],
        );

        let members = expand_container(&container, dir.path()).unwrap();
        assert_eq!(members.len(), 2);

        let dest = dir.path().join("extracted_bundle");
        let names: Vec<&str> = members.iter().map(|m| m.file_name.as_str()).collect();
        assert!(names.contains(&"top.csv"));
        assert!(names.contains(&"deep.txt"));
        for member in &members {
            assert_eq!(member.local_path.parent(), Some(dest.as_path()));
            assert!(member.local_path.exists());
        }
    }

    #[test]
    fn expand_preserves_member_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("stamped.zip");
        write_zip(&container, &[("data.csv", b"x" as &[u8])]);

        let members = expand_container(&container, dir.path()).unwrap();
        let member = &members[0];

        let expected = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 20)
            .unwrap()
            .and_utc()
            .timestamp();
        assert_eq!(member.modified_unix, expected);

        let meta = std::fs::metadata(&member.local_path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), expected);
    }

    #[test]
    fn expand_removes_container_even_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("broken.zip");
        std::fs::write(&container, b"this is not a zip archive").unwrap();

        let result = expand_container(&container, dir.path());
        assert!(matches!(result, Err(ExpandError::Archive { .. })));
        assert!(!container.exists());
    }

    #[test]
    fn later_member_wins_on_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("dup.zip");
        write_zip(
            &container,
            &[
                ("a/report.csv", b"first" as &[u8]),
                ("b/report.csv", b"second!"),
            ],
        );

        let members = expand_container(&container, dir.path()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].size, 7);
        let content = std::fs::read(&members[0].local_path).unwrap();
        assert_eq!(content, b"second!");
    }

    #[test]
    fn member_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("odd.zip");
        write_zip(&container, &[("dir/My Report v2!.csv", b"x" as &[u8])]);

        let members = expand_container(&container, dir.path()).unwrap();
        assert_eq!(members[0].file_name, "My_Report_v2_.csv");
        assert_eq!(members[0].file_type, "csv");
    }
}
