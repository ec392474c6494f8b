//! Collision-free stored-name assignment.
//!
//! Destinations are scanned once; every incoming file then reserves the
//! smallest free `" (n)"` suffix for its `(base name, extension)` pair in
//! O(1) amortized, so a whole request or batch gets deterministic names
//! without re-reading the filesystem per file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

/// Stored name used when a raw file name normalizes to nothing.
pub const UNNAMED_FILE: &str = "unnamed";

/// Assigns collision-free stored names against one destination directory.
///
/// Seeded with the names already present at the destination. Every
/// [`reserve`](Self::reserve) call claims a name that no earlier call and
/// no pre-existing file holds.
pub struct StoredNamePolicy {
    used: HashMap<NameKey, UsedNumbers>,
}

impl StoredNamePolicy {
    /// Builds a policy from the file names already occupying a destination.
    pub fn new<I>(existing_file_names: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut used: HashMap<NameKey, UsedNumbers> = HashMap::new();

        for existing in existing_file_names {
            let normalized = normalize_file_name(existing.as_ref());
            let parsed = parse_numbered_name(&normalized);
            used.entry(NameKey::new(&parsed.base, &parsed.extension))
                .or_default()
                .mark_used(parsed.number);
        }

        Self { used }
    }

    /// Reserves a stored name for `raw_file_name`.
    ///
    /// Returns the bare name when its `(base, extension)` pair is free,
    /// otherwise `"<base> (<n>)<ext>"` with the smallest unclaimed n ≥ 1.
    pub fn reserve(&mut self, raw_file_name: &str) -> String {
        let normalized = normalize_file_name(raw_file_name);
        let parsed = parse_numbered_name(&normalized);

        let number = self
            .used
            .entry(NameKey::new(&parsed.base, &parsed.extension))
            .or_default()
            .reserve_smallest();

        render_file_name(&parsed.base, &parsed.extension, number)
    }
}

/// File names (not directories) present in `dir`.
///
/// An absent directory yields an empty list, matching the lazy creation
/// of destinations on first placement.
pub fn existing_file_names(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Bucket key. Case-insensitive on Windows, matching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NameKey {
    base: String,
    extension: String,
}

impl NameKey {
    #[cfg(windows)]
    fn new(base: &str, extension: &str) -> Self {
        Self {
            base: base.to_lowercase(),
            extension: extension.to_lowercase(),
        }
    }

    #[cfg(not(windows))]
    fn new(base: &str, extension: &str) -> Self {
        Self {
            base: base.to_string(),
            extension: extension.to_string(),
        }
    }
}

struct ParsedName {
    base: String,
    extension: String,
    /// 0 means "no suffix"; n ≥ 1 was claimed by an existing `" (n)"` name.
    number: u32,
}

/// Reduces a raw name to its final path segment; blank results get a
/// fixed default label so suffixing always has something to work with.
fn normalize_file_name(raw: &str) -> String {
    let name = Path::new(raw.trim())
        .file_name()
        .map(|segment| segment.to_string_lossy().trim().to_string())
        .unwrap_or_default();

    if name.is_empty() {
        UNNAMED_FILE.to_string()
    } else {
        name
    }
}

fn parse_numbered_name(file_name: &str) -> ParsedName {
    let (base_with_suffix, extension) = split_extension(file_name);
    let (base, number) = parse_suffix_number(base_with_suffix);

    ParsedName {
        base: base.to_string(),
        extension: extension.to_string(),
        number,
    }
}

/// Splits at the last dot. A leading dot is part of the base name, so
/// dotfiles like `.gitignore` have no extension.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], &file_name[index..]),
        _ => (file_name, ""),
    }
}

/// Recognizes `"<base> (<k>)"` where k is a positive integer with no
/// extraneous characters; anything else keeps the whole base and claims 0.
fn parse_suffix_number(base_with_suffix: &str) -> (&str, u32) {
    let Some(stripped) = base_with_suffix.strip_suffix(')') else {
        return (base_with_suffix, 0);
    };

    let Some(open_index) = stripped.rfind(" (") else {
        return (base_with_suffix, 0);
    };

    if open_index == 0 {
        return (base_with_suffix, 0);
    }

    let digits = &stripped[open_index + 2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return (base_with_suffix, 0);
    }

    match digits.parse::<u32>() {
        Ok(number) if number >= 1 => (&base_with_suffix[..open_index], number),
        _ => (base_with_suffix, 0),
    }
}

fn render_file_name(base: &str, extension: &str, number: u32) -> String {
    if number == 0 {
        format!("{base}{extension}")
    } else {
        format!("{base} ({number}){extension}")
    }
}

/// Claimed suffix numbers for one `(base, extension)` bucket, plus the
/// smallest number not yet claimed.
#[derive(Default)]
struct UsedNumbers {
    numbers: HashSet<u32>,
    next_available: u32,
}

impl UsedNumbers {
    fn mark_used(&mut self, number: u32) {
        self.numbers.insert(number);
        if number == self.next_available {
            self.advance();
        }
    }

    fn reserve_smallest(&mut self) -> u32 {
        let reserved = self.next_available;
        self.numbers.insert(reserved);
        self.advance();
        reserved
    }

    fn advance(&mut self) {
        while self.numbers.contains(&self.next_available) {
            self.next_available += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reservation_returns_bare_name() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        assert_eq!(policy.reserve("report.txt"), "report.txt");
    }

    #[test]
    fn repeated_reservations_are_distinct_and_ascending() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        assert_eq!(policy.reserve("report.txt"), "report.txt");
        assert_eq!(policy.reserve("report.txt"), "report (1).txt");
        assert_eq!(policy.reserve("report.txt"), "report (2).txt");
        assert_eq!(policy.reserve("report.txt"), "report (3).txt");
    }

    #[test]
    fn reservation_fills_smallest_gap() {
        let mut policy =
            StoredNamePolicy::new(["report.txt", "report (1).txt", "report (3).txt"]);
        assert_eq!(policy.reserve("report.txt"), "report (2).txt");
        assert_eq!(policy.reserve("report.txt"), "report (4).txt");
    }

    #[test]
    fn existing_suffix_without_bare_name_keeps_bare_available() {
        let mut policy = StoredNamePolicy::new(["report (1).txt"]);
        assert_eq!(policy.reserve("report.txt"), "report.txt");
        assert_eq!(policy.reserve("report.txt"), "report (2).txt");
    }

    #[test]
    fn incoming_suffixed_name_shares_its_bucket() {
        let mut policy = StoredNamePolicy::new(["report.txt"]);
        // "report (2).txt" keys to the same (base, ext) as "report.txt".
        assert_eq!(policy.reserve("report (2).txt"), "report (1).txt");
    }

    #[test]
    fn different_extensions_use_separate_buckets() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        assert_eq!(policy.reserve("report.txt"), "report.txt");
        assert_eq!(policy.reserve("report.pdf"), "report.pdf");
        assert_eq!(policy.reserve("report.txt"), "report (1).txt");
    }

    #[test]
    fn name_without_extension() {
        let mut policy = StoredNamePolicy::new(["README"]);
        assert_eq!(policy.reserve("README"), "README (1)");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let mut policy = StoredNamePolicy::new([".gitignore"]);
        assert_eq!(policy.reserve(".gitignore"), ".gitignore (1)");
    }

    #[test]
    fn multi_dot_name_splits_at_last_dot() {
        let mut policy = StoredNamePolicy::new(["archive.tar.gz"]);
        assert_eq!(policy.reserve("archive.tar.gz"), "archive.tar (1).gz");
    }

    #[test]
    fn path_containing_name_is_reduced_to_file_name() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        assert_eq!(policy.reserve("dir/sub/report.txt"), "report.txt");
    }

    #[test]
    fn blank_name_gets_default_label() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        assert_eq!(policy.reserve("   "), UNNAMED_FILE);
        assert_eq!(policy.reserve(""), format!("{UNNAMED_FILE} (1)"));
    }

    #[test]
    fn fake_suffix_is_not_parsed_as_number() {
        // No space before the parenthesis, non-numeric content, zero, and a
        // bare " (2)" are all literal base names.
        let mut policy =
            StoredNamePolicy::new(["report(1).txt", "report (x).txt", "report (0).txt", " (2)"]);
        assert_eq!(policy.reserve("report.txt"), "report.txt");
        assert_eq!(policy.reserve("report(1).txt"), "report(1) (1).txt");
    }

    #[test]
    fn many_reservations_are_pairwise_distinct() {
        let mut policy = StoredNamePolicy::new(Vec::<String>::new());
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(policy.reserve("data.bin")));
        }
    }

    #[test]
    fn existing_file_names_lists_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut names = existing_file_names(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn existing_file_names_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let names = existing_file_names(&dir.path().join("nope")).unwrap();
        assert!(names.is_empty());
    }
}
