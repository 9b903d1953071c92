//! Reload content aggregation.
//!
//! A `ReloadAggregator` remembers the content of every CSS and JavaScript
//! file it has seen, so each batch can emit the full concatenated style and
//! script blocks rather than just the files that changed.

use crate::error::ReloadError;
use crate::ignore::IgnorePatterns;
use crate::watcher::ChangeEvent;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File whose content replaces the page body.
pub const BODY_FILE: &str = "body.html";

/// Body sent when the body file is removed. Never the empty string, which
/// means "unchanged" on the wire.
pub const EMPTY_BODY: &str = "<div></div>";

/// Hook receiving errors that are also logged.
pub type ErrorHook = Box<dyn Fn(ReloadError) + Send>;

/// Merged page content produced by one batch.
///
/// An empty string means "no change" on the wire; the `*_changed` flags carry
/// the same information without ambiguity and are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentUpdate {
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "Javascript")]
    pub javascript: String,
    #[serde(rename = "CSS")]
    pub css: String,
    #[serde(skip)]
    pub body_changed: bool,
    #[serde(skip)]
    pub css_changed: bool,
    #[serde(skip)]
    pub javascript_changed: bool,
}

impl ContentUpdate {
    /// True when the batch touched nothing the page cares about.
    pub fn is_unchanged(&self) -> bool {
        !(self.body_changed || self.css_changed || self.javascript_changed)
    }
}

/// Folds change batches into `ContentUpdate`s.
///
/// Owned by a single session; the content maps are never shared.
pub struct ReloadAggregator {
    ignore: IgnorePatterns,
    css: HashMap<PathBuf, String>,
    js: HashMap<PathBuf, String>,
    on_error: Option<ErrorHook>,
}

impl ReloadAggregator {
    /// Creates an aggregator with empty content maps.
    ///
    /// Malformed patterns are logged and never match.
    pub fn new<S: AsRef<str>>(ignore_patterns: &[S]) -> Self {
        Self::with_error_hook(ignore_patterns, None)
    }

    /// Creates an aggregator that forwards every error to `on_error`.
    pub fn with_error_hook<S: AsRef<str>>(
        ignore_patterns: &[S],
        on_error: Option<ErrorHook>,
    ) -> Self {
        let (ignore, errors) = IgnorePatterns::compile(ignore_patterns);
        let aggregator = Self {
            ignore,
            css: HashMap::new(),
            js: HashMap::new(),
            on_error,
        };
        for e in errors {
            aggregator.report(e);
        }
        aggregator
    }

    /// Current CSS content by path.
    pub fn css(&self) -> &HashMap<PathBuf, String> {
        &self.css
    }

    /// Current JavaScript content by path.
    pub fn javascript(&self) -> &HashMap<PathBuf, String> {
        &self.js
    }

    /// Applies one batch of changes and returns the merged update.
    pub fn aggregate(&mut self, batch: &[ChangeEvent]) -> ContentUpdate {
        let mut update = ContentUpdate::default();

        for event in batch {
            if self.ignore.is_ignored(&event.path) {
                debug!("Ignoring {}", event.path.display());
                continue;
            }

            let path = event.path.as_path();

            if path.file_name().is_some_and(|n| n == BODY_FILE) {
                self.apply_body(event, &mut update);
            }

            match path.extension().and_then(|e| e.to_str()) {
                Some("css") => {
                    update.css_changed |= self.apply(event, Kind::Css);
                }
                Some("js") => {
                    update.javascript_changed |= self.apply(event, Kind::Js);
                }
                _ => {}
            }
        }

        if update.css_changed {
            update.css = self.css.values().map(String::as_str).collect();
        }
        if update.javascript_changed {
            update.javascript = merge_scripts(&self.js);
        }

        update
    }

    fn apply_body(&self, event: &ChangeEvent, update: &mut ContentUpdate) {
        if event.was_removed {
            update.body = EMPTY_BODY.to_string();
            update.body_changed = true;
            return;
        }
        match read_content(&event.path) {
            Ok(body) => {
                update.body = body;
                update.body_changed = true;
            }
            Err(source) => self.report(ReloadError::Read {
                path: event.path.clone(),
                source,
            }),
        }
    }

    /// Updates one content map. Returns true if the map changed.
    fn apply(&mut self, event: &ChangeEvent, kind: Kind) -> bool {
        if event.was_removed {
            self.map_mut(kind).remove(&event.path);
            return true;
        }

        match read_content(&event.path) {
            Ok(content) => {
                self.map_mut(kind).insert(event.path.clone(), content);
                true
            }
            // Editors create and delete scratch files between batches.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} vanished before it was read", event.path.display());
                self.map_mut(kind).remove(&event.path);
                true
            }
            Err(source) => {
                self.report(ReloadError::Read {
                    path: event.path.clone(),
                    source,
                });
                false
            }
        }
    }

    fn map_mut(&mut self, kind: Kind) -> &mut HashMap<PathBuf, String> {
        match kind {
            Kind::Css => &mut self.css,
            Kind::Js => &mut self.js,
        }
    }

    fn report(&self, error: ReloadError) {
        warn!("{}", error);
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Css,
    Js,
}

fn read_content(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Concatenates scripts: numbered files by ascending index, then the rest.
fn merge_scripts(js: &HashMap<PathBuf, String>) -> String {
    let mut ordered: BTreeMap<i32, Vec<&PathBuf>> = BTreeMap::new();
    let mut unordered = Vec::new();

    for path in js.keys() {
        match load_order(path) {
            Some(index) => ordered.entry(index).or_default().push(path),
            None => unordered.push(path),
        }
    }

    let mut merged = String::new();
    for mut paths in ordered.into_values() {
        paths.sort();
        for path in paths {
            merged.push_str(&js[path]);
        }
    }
    for path in unordered {
        merged.push_str(&js[path]);
    }
    merged
}

/// Load-order index encoded in a script name, e.g. `2` for `lib.2.js`.
///
/// The name needs at least three dot-separated parts; the second-to-last one
/// is the index. Leading zeros are ignored and an all-zero index is `0`.
fn load_order(path: &Path) -> Option<i32> {
    let name = path.file_name()?.to_str()?;
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 3 {
        return None;
    }

    let raw = parts[parts.len() - 2];
    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return (!raw.is_empty()).then_some(0);
    }
    digits.parse().ok()
}
