//! Path normalization and glob expansion for target paths.
//!
//! Every dependency and output path is stored relative to the project root so
//! that glob matching, hashing and `.shastore` keys all compare equal strings.

use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use tracing::warn;

/// Whether `entry` contains shell-glob metacharacters.
pub fn has_glob_chars(entry: &str) -> bool {
  entry.contains(['*', '?', '['])
}

/// Normalize `entry` to a root-relative path.
///
/// `.` and `..` are resolved lexically (the path need not exist), absolute
/// paths under `root` lose the root prefix, and paths outside `root` get a
/// leading `..` chain.
pub fn normalize(entry: &str, root: &Path) -> String {
  let path = Path::new(entry);
  let absolute = if path.is_absolute() {
    clean(path)
  } else {
    clean(&root.join(path))
  };

  let relative = relative_to(&absolute, &clean(root));
  if relative.as_os_str().is_empty() {
    ".".to_string()
  } else {
    relative.to_string_lossy().into_owned()
  }
}

/// Expand `entry` against the filesystem under `root`.
///
/// Entries without glob metacharacters come back unchanged whether or not
/// they exist. Glob entries expand to the matching paths (root-relative,
/// sorted), which may be none.
pub fn expand(entry: &str, root: &Path) -> Vec<String> {
  if !has_glob_chars(entry) {
    return vec![entry.to_string()];
  }

  let escaped_root = Pattern::escape(&root.to_string_lossy());
  let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), entry);

  let paths = match glob::glob(&full_pattern) {
    Ok(paths) => paths,
    Err(e) => {
      warn!(pattern = entry, error = %e, "invalid glob pattern, treating it literally");
      return vec![entry.to_string()];
    }
  };

  let mut matches: Vec<String> = paths
    .filter_map(Result::ok)
    .map(|path| normalize(&path.to_string_lossy(), root))
    .collect();
  matches.sort();
  matches.dedup();
  matches
}

/// A dependency entry compiled once for matching against many output paths.
#[derive(Debug)]
pub struct DependencyMatcher<'a> {
  entry: &'a str,
  pattern: Option<Pattern>,
}

impl<'a> DependencyMatcher<'a> {
  pub fn new(entry: &'a str) -> Self {
    let pattern = if has_glob_chars(entry) {
      Pattern::new(entry).ok()
    } else {
      None
    };
    Self { entry, pattern }
  }

  /// Whether the dependency refers to `path`.
  pub fn matches(&self, path: &str) -> bool {
    self.entry == path || self.pattern.as_ref().is_some_and(|p| p.matches(path))
  }
}

fn clean(path: &Path) -> PathBuf {
  let mut cleaned = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if matches!(cleaned.components().next_back(), Some(Component::Normal(_))) {
          cleaned.pop();
        } else if !cleaned.has_root() {
          cleaned.push("..");
        }
      }
      other => cleaned.push(other.as_os_str()),
    }
  }
  cleaned
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
  let path_components: Vec<_> = path.components().collect();
  let base_components: Vec<_> = base.components().collect();

  let common = path_components
    .iter()
    .zip(&base_components)
    .take_while(|(a, b)| a == b)
    .count();

  let mut relative = PathBuf::new();
  for _ in common..base_components.len() {
    relative.push("..");
  }
  for component in &path_components[common..] {
    relative.push(component.as_os_str());
  }
  relative
}
