use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::config::Rule;

/// Flattened extension → destination lookup built from the ordered rules.
///
/// Built once per watch session. A rule registered later wins any
/// extension it shares with an earlier rule.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    destinations: HashMap<String, PathBuf>,
}

impl RuleIndex {
    pub fn build(rules: &[Rule]) -> Self {
        let mut destinations = HashMap::new();

        for rule in rules {
            for ext in &rule.extensions {
                let Some(key) = normalize_extension(ext) else {
                    continue;
                };
                if let Some(previous) = destinations.insert(key.clone(), rule.destination.clone()) {
                    if previous != rule.destination {
                        tracing::debug!(
                            "Extension {} reassigned from {} to {}",
                            key,
                            previous.display(),
                            rule.destination.display()
                        );
                    }
                }
            }
        }

        Self { destinations }
    }

    /// Destination for an extension such as ".zip"; case-insensitive
    pub fn lookup(&self, ext: &str) -> Option<&Path> {
        let key = normalize_extension(ext)?;
        self.destinations.get(&key).map(PathBuf::as_path)
    }

    /// Destination for the extension of `path`, if any rule claims it
    pub fn destination_for(&self, path: &Path) -> Option<&Path> {
        let ext = file_extension(path)?;
        self.destinations.get(&ext).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Lowercased extension of `path` including the leading dot.
///
/// The extension is everything from the last `.` of the file name, so
/// `.bashrc` is all extension and `archive.tar.gz` ends in `.gz`.
pub fn file_extension(path: &Path) -> Option<String> {
    let (_, ext) = split_extension(path.file_name()?);
    let ext = ext?.to_string_lossy().to_lowercase();
    if ext == "." {
        return None;
    }
    Some(ext)
}

/// Split a file name at its last `.` into stem and extension, keeping
/// the dot on the extension: `name.tar.gz` → (`name.tar`, `.gz`).
/// `.zip` has an empty stem and `README` has no extension.
pub fn split_extension(name: &OsStr) -> (OsString, Option<OsString>) {
    match name.to_str() {
        Some(name) => match name.rfind('.') {
            Some(dot) => (name[..dot].into(), Some(name[dot..].into())),
            None => (name.into(), None),
        },
        // Non UTF-8 names fall back to std's split, which treats a leading dot as stem
        None => {
            let path = Path::new(name);
            let stem = path.file_stem().unwrap_or(name).to_os_string();
            let ext = path.extension().map(|ext| {
                let mut dotted = OsString::from(".");
                dotted.push(ext);
                dotted
            });
            (stem, ext)
        }
    }
}

fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim();
    if ext.is_empty() || ext == "." {
        return None;
    }
    let ext = ext.to_lowercase();
    if ext.starts_with('.') {
        Some(ext)
    } else {
        Some(format!(".{}", ext))
    }
}
