/// Cache key used for the drive root.
pub const ROOT_KEY: &str = "/";

/// A path broken into its directory part, its last element and the
/// normalized form of the whole thing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPath {
    /// Everything before the leaf, empty when the leaf sits at the root.
    pub dir: String,
    pub leaf: String,
    pub canonical: String,
}

/// Splits a Unix-like path into its components, dropping empty elements and
/// unnecessary leading and trailing slashes. A blank or separator-only path
/// yields all-empty fields.
pub fn split_path(path: &str) -> SplitPath {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.split_last() {
        None => SplitPath::default(),
        Some((leaf, dirs)) => SplitPath {
            dir: dirs.join("/"),
            leaf: leaf.to_string(),
            canonical: segments.join("/"),
        },
    }
}

/// True for "/", "//" and friends. The empty string is not the root.
pub fn is_root(path: &str) -> bool {
    !path.is_empty() && path.chars().all(|c| c == '/')
}

pub fn join(dir: &str, leaf: &str) -> String {
    if dir.is_empty() {
        leaf.to_string()
    } else {
        format!("{dir}/{leaf}")
    }
}
