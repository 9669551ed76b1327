use crate::types::RemoteDirEntry;

// permissions, links, owner, group, size, month, day, time|year
const LONG_LISTING_FIELDS: usize = 8;

/// Parses `LC_ALL=C ls -lhAH` output, keeping the order `ls` printed.
/// Only directories, regular files and symlinks are reported; the `total`
/// line and anything that does not have enough columns are skipped.
pub fn parse_long_listing(output: &str) -> Vec<RemoteDirEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("total ") {
            continue;
        }
        let kind = line.chars().next();
        if !matches!(kind, Some('-' | 'd' | 'l')) {
            continue;
        }
        let Some((fields, name)) = split_fields(line, LONG_LISTING_FIELDS) else {
            continue;
        };
        let name = match kind {
            Some('l') => name.split_once(" -> ").map_or(name, |(link, _)| link),
            _ => name,
        };
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        entries.push(RemoteDirEntry {
            name: name.to_string(),
            size: fields[4].to_string(),
            modified: fields[5..8].join(" "),
            is_directory: kind == Some('d'),
        });
    }
    entries
}

/// Splits off `count` whitespace-separated fields and returns them with the
/// untouched remainder, so names keep their inner spacing.
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line;
    for _ in 0..count {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    let name = rest.trim_start();
    if name.is_empty() {
        return None;
    }
    Some((fields, name))
}
