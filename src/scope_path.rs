use std::path::{Path, PathBuf};

pub fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

/// Strips `./` prefixes, leading separators and trailing slashes from a
/// plan-relative path.
pub fn normalize_relative(path: &str) -> String {
    let mut normalized = normalize(path.trim());
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}

pub fn is_within_scope(path: &str, root: &str) -> bool {
    let path = normalize(path);
    let root = normalize(root);

    if path == root {
        return true;
    }

    if root == "/" {
        return path.starts_with('/');
    }

    if cfg!(windows) {
        let path_lower = path.to_ascii_lowercase();
        let root_lower = root.to_ascii_lowercase();
        return path_lower.starts_with(&(root_lower + "/"));
    }

    path.starts_with(&(root + "/"))
}

/// Joins a plan-relative path onto `dir`, returning `None` when the result
/// would leave `dir` or names `dir` itself.
pub fn resolve_within(dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = normalize_relative(relative);
    if relative.is_empty() || relative == "." {
        return None;
    }
    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }
    let joined = dir.join(&relative);
    let joined_text = joined.to_string_lossy();
    let dir_text = dir.to_string_lossy();
    if normalize(&joined_text) == normalize(&dir_text) {
        return None;
    }
    is_within_scope(&joined_text, &dir_text).then_some(joined)
}

/// Final path component of a plan-relative path.
pub fn base_name(relative: &str) -> &str {
    let trimmed = relative.trim().trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}
