//! Windows path arithmetic on plain strings
//!
//! Reparse targets, volume roots and FRN lookups all deal in Windows paths,
//! so the arithmetic is done on `\`-separated strings rather than through
//! `std::path`, which follows the host's rules.

/// Primary separator
pub const SEPARATOR: char = '\\';

/// Prefix of verbatim (long) paths
pub const VERBATIM_PREFIX: &str = r"\\?\";

/// Prefix of NT object-manager paths found in reparse substitute names
pub const NT_OBJECT_PREFIX: &str = r"\??\";

/// Is `c` a path separator (either slash)
pub fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// True for `X:` followed by anything
pub fn is_drive_rooted(path: &str) -> bool {
    let mut chars = path.chars();
    matches!((chars.next(), chars.next()), (Some(d), Some(':')) if d.is_ascii_alphabetic())
}

/// Strip a `\\?\` prefix, if present
pub fn strip_verbatim(path: &str) -> &str {
    path.strip_prefix(VERBATIM_PREFIX).unwrap_or(path)
}

/// Root portion of a path: `C:\`, `\\server\share\` or `\\?\C:\`
pub fn path_root(path: &str) -> Option<String> {
    let len = root_len(path)?;
    let root = &path[..len];

    if let Some(rest) = root.strip_prefix(VERBATIM_PREFIX) {
        return path_root(rest).map(|root| format!("{}{}", VERBATIM_PREFIX, root));
    }
    if is_drive_rooted(root) {
        return Some(format!("{}{}", &root[..2], SEPARATOR));
    }
    if root.len() > 1 {
        let mut parts = root[2..].split(is_separator).filter(|p| !p.is_empty());
        let server = parts.next()?;
        let share = parts.next()?;
        return Some(format!(r"\\{}\{}\", server, share));
    }
    Some(SEPARATOR.to_string())
}

/// Byte length of the root as it appears in `path`. A drive-relative `C:x`
/// has the 2-byte root `C:`.
fn root_len(path: &str) -> Option<usize> {
    if let Some(rest) = path.strip_prefix(VERBATIM_PREFIX) {
        return root_len(rest).map(|len| VERBATIM_PREFIX.len() + len);
    }

    let bytes = path.as_bytes();
    let sep = |i: usize| bytes.get(i).is_some_and(|&b| b == b'\\' || b == b'/');

    if is_drive_rooted(path) {
        return Some(if sep(2) { 3 } else { 2 });
    }

    if sep(0) && sep(1) {
        // UNC: \\server\share\ with any run of separators between parts
        let mut i = 2;
        for _ in 0..2 {
            while sep(i) {
                i += 1;
            }
            let start = i;
            while i < bytes.len() && !sep(i) {
                i += 1;
            }
            if i == start {
                return None;
            }
        }
        if sep(i) {
            i += 1;
        }
        return Some(i);
    }

    sep(0).then_some(1)
}

/// Everything before the last separator, after trailing separators are removed
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(is_separator);
    let idx = trimmed.rfind(is_separator)?;
    Some(&trimmed[..idx])
}

/// Join `rel` onto `base` with exactly one separator between them
pub fn join(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches(is_separator);
    let rel = rel.trim_start_matches(is_separator);
    if base.is_empty() {
        return rel.to_string();
    }
    format!("{}{}{}", base, SEPARATOR, rel)
}

/// Collapse `.` and `..` segments, unify separators and drop empty segments.
/// `..` never climbs above the root, which is kept as written.
pub fn normalize(path: &str) -> String {
    let len = root_len(path).unwrap_or(0);
    let (root, rest) = path.split_at(len);

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut result = root.replace('/', "\\");
    result.push_str(&segments.join("\\"));
    result
}

/// Resolve a relative reparse target against the link's own location
pub fn resolve_relative_to_link(link_path: &str, target: &str) -> String {
    let link = link_path.trim_end_matches(SEPARATOR);
    let target = target.trim_start_matches(SEPARATOR);
    let base = parent(link).unwrap_or("");
    normalize(&join(base, target))
}
