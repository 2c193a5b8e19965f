//! Role files on disk: discovery and atomic persistence.
//!
//! Saved roles are written to a temporary sibling first, synced, then renamed
//! over the target so a crash never leaves a half-written role file behind.

use super::definition::RoleDefinition;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// YAML files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_role_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Path a role is saved to inside `dir`.
pub fn role_file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.yaml", name))
}

/// Serialize `role` into `dir/<name>.yaml`, replacing any existing file.
pub fn save_role(dir: &Path, role: &RoleDefinition) -> io::Result<PathBuf> {
    let yaml = role
        .to_yaml()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    fs::create_dir_all(dir)?;
    let target = role_file_path(dir, &role.name);
    let temp = dir.join(format!(".{}.yaml.tmp", role.name));

    let written = write_and_sync(&temp, yaml.as_bytes()).and_then(|()| fs::rename(&temp, &target));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    #[cfg(unix)]
    if let Ok(parent) = File::open(dir) {
        let _ = parent.sync_all();
    }

    Ok(target)
}

fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::parse_role_document;
    use tempfile::TempDir;

    #[test]
    fn test_lists_yaml_files_sorted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.yml"), "").unwrap();
        fs::write(temp.path().join("a.yaml"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp.path().join("dir.yaml")).unwrap();

        let files = list_role_files(temp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.yml"]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_role_files(&temp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_dir_and_round_trips() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".troupe").join("roles");
        let mut role = RoleDefinition::new("helper");
        role.description = "Helps".to_string();

        let path = save_role(&dir, &role).unwrap();
        assert_eq!(path, dir.join("helper.yaml"));
        assert!(!dir.join(".helper.yaml.tmp").exists());

        let content = fs::read_to_string(&path).unwrap();
        let parsed = parse_role_document(&content).unwrap();
        assert_eq!(parsed[0].as_ref().unwrap(), &role);
    }
}
