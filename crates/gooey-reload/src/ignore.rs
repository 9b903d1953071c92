//! Ignore patterns for watched files.
//!
//! Patterns use `path.Match` style shell globs and are matched against the
//! file's base name only, never the full path:
//!
//! - `*` matches any run of characters, `?` exactly one
//! - `[a-z]` matches a class; `[^a-z]` (or `[!a-z]`) its complement
//! - `\` escapes the next character, so `\*` matches a literal `*`; inside a
//!   class a literal `-` or `]` must be escaped
//!
//! Patterns are rewritten into the syntax `glob::Pattern` understands before
//! they are compiled.

use crate::error::ReloadError;
use glob::{Pattern, PatternError};
use std::path::Path;
use tracing::warn;

const ERR_TRAILING_ESCAPE: &str = "escape at end of pattern";
const ERR_UNCLOSED_CLASS: &str = "unterminated character class";
const ERR_CLASS_CHAR: &str = "unescaped '-' or ']' in character class";

/// A compiled set of ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnorePatterns {
    patterns: Vec<Pattern>,
}

impl IgnorePatterns {
    /// Compiles `patterns`.
    ///
    /// Malformed patterns are dropped and returned alongside the set; a
    /// dropped pattern matches nothing.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> (Self, Vec<ReloadError>) {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut errors = Vec::new();

        for raw in patterns {
            let raw = raw.as_ref();
            match to_glob_syntax(raw).and_then(|glob| Pattern::new(&glob)) {
                Ok(p) => compiled.push(p),
                Err(source) => {
                    warn!("Ignoring malformed pattern {:?}: {}", raw, source);
                    errors.push(ReloadError::Pattern {
                        pattern: raw.to_string(),
                        source,
                    });
                }
            }
        }

        (
            Self {
                patterns: compiled,
            },
            errors,
        )
    }

    /// Returns true if the base name of `path` matches any pattern.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialect translation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

fn bad(pos: usize, msg: &'static str) -> PatternError {
    PatternError { pos, msg }
}

/// Rewrites a `path.Match` pattern into `glob::Pattern` syntax.
fn to_glob_syntax(raw: &str) -> Result<String, PatternError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let c = *chars
                    .get(i + 1)
                    .ok_or_else(|| bad(i, ERR_TRAILING_ESCAPE))?;
                push_literal(&mut out, c);
                i += 2;
            }
            '*' => {
                // A run of stars is one star; glob would read `**` as a
                // recursive wildcard.
                while chars.get(i) == Some(&'*') {
                    i += 1;
                }
                out.push('*');
            }
            '?' => {
                out.push('?');
                i += 1;
            }
            '[' => i = parse_class(&chars, i, &mut out)?,
            c => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' | ']' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        _ => out.push(c),
    }
}

/// Parses the class opening at `start`, writes its glob form and returns the
/// index just past the closing `]`.
fn parse_class(chars: &[char], start: usize, out: &mut String) -> Result<usize, PatternError> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('^') | Some('!'));
    if negated {
        i += 1;
    }

    let mut items = Vec::new();
    loop {
        match chars.get(i) {
            None => return Err(bad(start, ERR_UNCLOSED_CLASS)),
            Some(']') if !items.is_empty() => {
                i += 1;
                break;
            }
            _ => {}
        }

        let (lo, next) = class_char(chars, i, start)?;
        i = next;
        if chars.get(i) == Some(&'-') {
            let (hi, next) = class_char(chars, i + 1, start)?;
            i = next;
            items.push(ClassItem::Range(lo, hi));
        } else {
            items.push(ClassItem::Char(lo));
        }
    }

    push_class(out, negated, items);
    Ok(i)
}

fn class_char(chars: &[char], i: usize, start: usize) -> Result<(char, usize), PatternError> {
    match chars.get(i) {
        None => Err(bad(start, ERR_UNCLOSED_CLASS)),
        Some('-') | Some(']') => Err(bad(i, ERR_CLASS_CHAR)),
        Some('\\') => chars
            .get(i + 1)
            .map(|&c| (c, i + 2))
            .ok_or_else(|| bad(i, ERR_TRAILING_ESCAPE)),
        Some(&c) => Ok((c, i + 1)),
    }
}

/// Writes a class so glob reads back exactly `items`.
///
/// glob has no escapes inside a class: `]` is only literal first, `-` only
/// last, and `!` never first unless negating.
fn push_class(out: &mut String, negated: bool, items: Vec<ClassItem>) {
    let mut singles = Vec::new();
    let mut ranges = Vec::new();

    for item in items {
        match item {
            ClassItem::Char(c) => singles.push(c),
            ClassItem::Range(lo, hi) if lo == hi => singles.push(lo),
            // Reversed ranges match nothing.
            ClassItem::Range(lo, hi) if lo > hi => {}
            ClassItem::Range(mut lo, mut hi) => {
                // Peel awkward endpoints off as single characters. All of
                // them are ASCII, so stepping by one stays ASCII.
                if matches!(lo, ']' | '-' | '!') {
                    singles.push(lo);
                    lo = (lo as u8 + 1) as char;
                }
                if matches!(hi, ']' | '-') {
                    singles.push(hi);
                    hi = (hi as u8 - 1) as char;
                }
                match lo.cmp(&hi) {
                    std::cmp::Ordering::Less => ranges.push((lo, hi)),
                    std::cmp::Ordering::Equal => singles.push(lo),
                    std::cmp::Ordering::Greater => {}
                }
            }
        }
    }
    singles.sort_unstable();
    singles.dedup();

    if singles.is_empty() && ranges.is_empty() {
        // Only reversed ranges: the class matches nothing.
        out.push_str(if negated { "?" } else { "[!\u{0}-\u{10FFFF}]" });
        return;
    }
    if !negated && ranges.is_empty() && singles.len() == 1 {
        push_literal(out, singles[0]);
        return;
    }

    let bracket = singles.contains(&']');
    let dash = singles.contains(&'-');
    let bang = singles.contains(&'!');
    let others: Vec<char> = singles
        .iter()
        .copied()
        .filter(|c| !matches!(c, ']' | '-' | '!'))
        .collect();

    out.push('[');
    if negated {
        out.push('!');
    }
    if bracket {
        out.push(']');
    }
    for (lo, hi) in ranges.iter().copied() {
        out.push(lo);
        out.push('-');
        out.push(hi);
    }
    out.extend(others.iter().copied());

    let bang_first = !negated && !bracket && ranges.is_empty() && others.is_empty();
    match (bang, dash) {
        // A leading `!` would negate; `-` followed by one more char is safe.
        (true, true) if bang_first => out.push_str("-!"),
        (true, true) => out.push_str("!-"),
        (true, false) => out.push('!'),
        (false, true) => out.push('-'),
        (false, false) => {}
    }
    out.push(']');
}
