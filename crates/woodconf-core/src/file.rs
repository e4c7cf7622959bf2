//! Named configuration documents.

use serde::{Deserialize, Serialize};

/// A named configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub data: String,
}

impl File {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Extension of the file name without the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        let base = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        match base.rfind('.') {
            Some(idx) => Some(&base[idx + 1..]),
            None => None,
        }
    }

    /// Name as exposed to the orchestrator: separators become `__` and the
    /// extension is dropped.
    pub fn sanitized_name(&self) -> String {
        let flat = self.name.replace(['/', '\\'], "__");
        match flat.rfind('.') {
            Some(idx) if idx > 0 => flat[..idx].to_string(),
            _ => flat,
        }
    }
}

/// Returns every name that occurs more than once, in order of first appearance.
pub fn find_duplicate_names(files: &[File]) -> Vec<String> {
    let mut duplicates: Vec<String> = Vec::new();
    for (idx, file) in files.iter().enumerate() {
        if duplicates.contains(&file.name) {
            continue;
        }
        if files[idx + 1..].iter().any(|other| other.name == file.name) {
            duplicates.push(file.name.clone());
        }
    }
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(File::new("build.star", "").extension(), Some("star"));
        assert_eq!(File::new("a.b/build", "").extension(), None);
        assert_eq!(File::new("dir/build.yaml", "").extension(), Some("yaml"));
        assert_eq!(File::new("build", "").extension(), None);
    }

    #[test]
    fn test_sanitized_name() {
        assert_eq!(File::new("a/b", "").sanitized_name(), "a__b");
        assert_eq!(File::new("a/b.yaml", "").sanitized_name(), "a__b");
        assert_eq!(
            File::new(".woodpecker/build.yaml", "").sanitized_name(),
            ".woodpecker__build"
        );
        assert_eq!(File::new("release", "").sanitized_name(), "release");
        assert_eq!(File::new(".hidden", "").sanitized_name(), ".hidden");
    }

    #[test]
    fn test_find_duplicate_names() {
        let files = vec![
            File::new("a", "1"),
            File::new("b", "2"),
            File::new("a", "3"),
            File::new("c", "4"),
            File::new("b", "5"),
            File::new("a", "6"),
        ];
        assert_eq!(find_duplicate_names(&files), vec!["a", "b"]);
        assert!(find_duplicate_names(&files[..2]).is_empty());
    }
}
