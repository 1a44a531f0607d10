//! Semantic version extraction and changelog section lookup.
//!
//! Tag names arrive as free text (`v1.0.0`, `release-1.0.0`); changelogs are
//! markdown documents maintained by humans. This crate pins down the two
//! parsing jobs the release engine needs: find the first semantic version in
//! a string, and find the changelog section whose heading names a given
//! version.
//!
//! # Example
//!
//! ```
//! use greenlight_changes::{find_changeset, parse_version};
//!
//! let version = parse_version("v1.2.0").expect("version");
//! assert_eq!(version.to_string(), "1.2.0");
//!
//! let md = "# Changelog\n## 1.2.0\nAdded things.\n## 1.1.0\nOlder.";
//! let section = find_changeset(md, "v1.2.0").expect("section");
//! assert_eq!(section.name, "1.2.0");
//! assert_eq!(section.body, "Added things.");
//! ```

use std::fmt;

/// A parsed semantic version. The leading `v` of a tag name is stripped;
/// [`fmt::Display`] renders the normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release identifiers after `-`, verbatim.
    pub pre: Option<String>,
    /// Build metadata after `+`, verbatim.
    pub build: Option<String>,
}

impl SemVer {
    /// Whether this is a pre-release version.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

/// A changelog section: the heading text and the content below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub name: String,
    pub body: String,
}

/// Scan `text` for the first substring matching
/// `v?MAJOR.MINOR.PATCH(-PRE)?(+BUILD)?` and return it parsed, stripping a
/// leading `v`. Numeric components must not have leading zeros.
pub fn parse_version(text: &str) -> Option<SemVer> {
    (0..text.len())
        .filter(|i| text.is_char_boundary(*i))
        .find_map(|i| parse_at(&text[i..]))
}

fn parse_at(s: &str) -> Option<SemVer> {
    let rest = s.strip_prefix('v').unwrap_or(s);
    let (major, rest) = take_number(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (minor, rest) = take_number(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (patch, rest) = take_number(rest)?;
    let (pre, rest) = take_suffix(rest, '-');
    let (build, _) = take_suffix(rest, '+');
    Some(SemVer {
        major,
        minor,
        patch,
        pre,
        build,
    })
}

/// Parse a decimal component with no leading zeros (`0` itself is fine).
fn take_number(s: &str) -> Option<(u64, &str)> {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let (number, rest) = s.split_at(digits);
    if number.len() > 1 && number.starts_with('0') {
        return None;
    }
    Some((number.parse().ok()?, rest))
}

/// Consume `marker` followed by one or more identifier characters
/// (`[0-9A-Za-z-.]`). An empty suffix leaves the input untouched.
fn take_suffix(s: &str, marker: char) -> (Option<String>, &str) {
    let Some(after) = s.strip_prefix(marker) else {
        return (None, s);
    };
    let len = after.len()
        - after
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            .len();
    if len == 0 {
        return (None, s);
    }
    let (suffix, rest) = after.split_at(len);
    (Some(suffix.to_string()), rest)
}

/// Find the changelog section for `tag` in `markdown`.
///
/// Headings are recognized in ATX (`## <text>`) and setext
/// (`<text>` underlined with `===` or `---`) forms. The section body runs
/// from the heading to the next recognized heading or end of document,
/// trimmed. Returns `None` when `tag` has no version or no heading matches.
pub fn find_changeset(markdown: &str, tag: &str) -> Option<Changeset> {
    let target = parse_version(tag)?;
    let lines: Vec<&str> = markdown.lines().collect();

    struct Heading {
        line: usize,
        content_start: usize,
        text: String,
    }

    let mut headings: Vec<Heading> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if let Some(text) = atx_heading(lines[i]) {
            headings.push(Heading {
                line: i,
                content_start: i + 1,
                text,
            });
            i += 1;
        } else if !lines[i].trim().is_empty()
            && !is_underline(lines[i])
            && i + 1 < lines.len()
            && is_underline(lines[i + 1])
        {
            headings.push(Heading {
                line: i,
                content_start: i + 2,
                text: lines[i].trim().to_string(),
            });
            i += 2;
        } else {
            i += 1;
        }
    }

    for (idx, heading) in headings.iter().enumerate() {
        if parse_version(&heading.text).as_ref() != Some(&target) {
            continue;
        }
        let end = headings
            .get(idx + 1)
            .map(|next| next.line)
            .unwrap_or(lines.len());
        let body = lines[heading.content_start..end].join("\n").trim().to_string();
        return Some(Changeset {
            name: heading.text.clone(),
            body,
        });
    }
    None
}

fn atx_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let after = trimmed.trim_start_matches('#');
    if after.len() == trimmed.len() {
        return None;
    }
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }
    Some(after.trim().to_string())
}

fn is_underline(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && (trimmed.chars().all(|c| c == '=') || trimmed.chars().all(|c| c == '-'))
}
