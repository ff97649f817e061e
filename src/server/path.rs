//! Helpers for resolving client supplied paths against the session working
//! directory and for expanding listing wildcards.

use crate::auth::UserDetail;
use crate::storage::{self, Fileinfo, Metadata, StorageBackend};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Resolves `arg` against the working directory `cwd`. An absolute argument
/// replaces the working directory, a relative one is joined onto it. `..`
/// components are resolved textually and can never climb above `/`.
pub fn with_cwd(cwd: &Path, arg: &str) -> PathBuf {
    let joined = if arg.starts_with('/') {
        PathBuf::from(arg)
    } else {
        cwd.join(arg)
    };

    let mut normalized = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::Normal(p) => normalized.push(p),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    normalized
}

/// Escapes a path for use inside the quoted part of a 257 reply: RFC 959
/// doubles embedded double-quotes.
pub fn path_escape(path: &str) -> String {
    path.replace('"', "\"\"")
}

/// Removes leading `-x` style option words from a LIST/NLST argument, e.g.
/// `-la tmp` becomes `tmp`.
pub fn strip_options(arg: &str) -> &str {
    let mut rest = arg;
    loop {
        let trimmed = rest.trim_start();
        match trimmed.split(' ').next() {
            Some(word) if word.starts_with('-') && word.len() > 1 => {
                rest = &trimmed[word.len()..];
            }
            _ => return trimmed,
        }
    }
}

/// Tells whether a listing argument contains `*` or `?` wildcards.
pub fn has_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Matches `name` against a single-level wildcard pattern where `*` matches
/// any run of characters and `?` matches exactly one. There is no recursive
/// `**` form.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    // Classic two-pointer scan with backtracking to the last star.
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((spi, sni)) = star {
            pi = spi + 1;
            ni = sni + 1;
            star = Some((spi, sni + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Expands a listing argument into a flat list of entries. A plain file
/// yields itself, a directory yields its contents, and a wildcard in the
/// last component is matched against one directory level.
pub async fn glob<Storage, User>(
    storage: &Arc<Storage>,
    user: &User,
    path: &Path,
) -> Result<Vec<Fileinfo<PathBuf, Storage::Metadata>>, storage::Error>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    let last = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    if has_wildcards(&last) {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        let entries = storage.list(user, &parent).await?;
        Ok(entries.into_iter().filter(|fi| wildcard_match(&last, &fi.file_name())).collect())
    } else {
        let meta = storage.metadata(user, path).await?;
        if meta.is_dir() {
            storage.list(user, path).await
        } else {
            Ok(vec![Fileinfo {
                path: path.to_path_buf(),
                metadata: meta,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn with_cwd_relative() {
        assert_eq!(with_cwd(Path::new("/"), "foo"), PathBuf::from("/foo"));
        assert_eq!(with_cwd(Path::new("/a/b"), "c"), PathBuf::from("/a/b/c"));
        assert_eq!(with_cwd(Path::new("/a/b"), "./c"), PathBuf::from("/a/b/c"));
    }

    #[test]
    fn with_cwd_absolute() {
        assert_eq!(with_cwd(Path::new("/a/b"), "/c"), PathBuf::from("/c"));
        assert_eq!(with_cwd(Path::new("/a/b"), "/"), PathBuf::from("/"));
    }

    #[test]
    fn with_cwd_dotdot() {
        assert_eq!(with_cwd(Path::new("/a/b"), ".."), PathBuf::from("/a"));
        assert_eq!(with_cwd(Path::new("/a/b"), "../../.."), PathBuf::from("/"));
        assert_eq!(with_cwd(Path::new("/"), "../etc/passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(with_cwd(Path::new("/a"), "b/../c"), PathBuf::from("/a/c"));
    }

    #[test]
    fn escape_doubles_quotes() {
        assert_eq!(path_escape(r#"/plain/path"#), r#"/plain/path"#);
        assert_eq!(path_escape(r#"/a"b"#), r#"/a""b"#);
    }

    #[test]
    fn strip_list_options() {
        assert_eq!(strip_options(""), "");
        assert_eq!(strip_options("tmp"), "tmp");
        assert_eq!(strip_options("-la"), "");
        assert_eq!(strip_options("-la tmp"), "tmp");
        assert_eq!(strip_options("-la -x tmp"), "tmp");
        assert_eq!(strip_options("-la name with spaces"), "name with spaces");
    }

    #[test]
    fn wildcard_star() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.txt", "notes.txt"));
        assert!(!wildcard_match("*.txt", "notes.text"));
        assert!(wildcard_match("data*", "data-2021.csv"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn wildcard_question_mark() {
        assert!(wildcard_match("file?.log", "file1.log"));
        assert!(!wildcard_match("file?.log", "file12.log"));
        assert!(!wildcard_match("?", ""));
    }

    #[test]
    fn wildcard_literal() {
        assert!(wildcard_match("exact.txt", "exact.txt"));
        assert!(!wildcard_match("exact.txt", "other.txt"));
    }
}
