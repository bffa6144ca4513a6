use crate::error::AppError;
use std::path::{Component, Path};

const FORBIDDEN_PATTERNS: &[&str] = &["\0", "\n", "\r"];

const PROTECTED_ROOTS: &[&str] = &[
    "/",
    "/Applications",
    "/bin",
    "/sbin",
    "/usr",
    "/System",
    "/Library",
    "/etc",
    "/proc",
    "/sys",
    "/dev",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

/// Rejects paths an oracle plan must never name: empty, absolute, or escaping
/// the directory being organized.
pub fn validate_relative_path(path: &str) -> Result<(), AppError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(AppError::General("path is empty".to_string()));
    }

    for pattern in FORBIDDEN_PATTERNS {
        if trimmed.contains(pattern) {
            return Err(AppError::General(format!(
                "path contains forbidden character: {}",
                pattern.escape_debug()
            )));
        }
    }

    if trimmed.starts_with('/') || trimmed.starts_with('\\') || is_windows_style_path(trimmed) {
        return Err(AppError::General(format!(
            "absolute path not allowed: {trimmed}"
        )));
    }

    let unified = trimmed.replace('\\', "/");
    for component in Path::new(&unified).components() {
        match component {
            Component::ParentDir => {
                return Err(AppError::General(
                    "path traversal (.. component) not allowed".to_string(),
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::General(format!(
                    "absolute path not allowed: {trimmed}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

pub fn is_protected_path(path: &str) -> bool {
    let normalized = normalize_path_for_match(path);
    PROTECTED_ROOTS.iter().any(|root| {
        let root_normalized = normalize_path_for_match(root);
        if is_windows_style_path(&root_normalized) {
            let normalized_lower = normalized.to_ascii_lowercase();
            let root_lower = root_normalized.to_ascii_lowercase();
            normalized_lower == root_lower
                || normalized_lower.starts_with(&format!("{root_lower}/"))
        } else if root_normalized == "/" {
            normalized == "/"
        } else {
            normalized == root_normalized || normalized.starts_with(&format!("{root_normalized}/"))
        }
    })
}

fn normalize_path_for_match(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

fn is_windows_style_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

pub fn validate_not_protected(path: &str) -> Result<(), AppError> {
    if is_protected_path(path) {
        return Err(AppError::General(format!(
            "organizing a protected path is not allowed: {path}"
        )));
    }
    Ok(())
}
