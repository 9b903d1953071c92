//! Gooey Reload - hot reload content for live pages
//!
//! This crate turns raw filesystem change events into the payloads a Gooey
//! page needs to patch itself without a full refresh:
//!
//! - `body.html` replaces the document body
//! - all watched `.css` files are concatenated into one style block
//! - all watched `.js` files are concatenated into one script block, with
//!   numbered files (`shim.0.js`, `lib.1.js`) loaded first, in index order
//!
//! # Example
//!
//! ```no_run
//! use gooey_reload::{ChangeEvent, ReloadAggregator};
//!
//! let mut aggregator = ReloadAggregator::new(&[".#*".to_string()]);
//! let update = aggregator.aggregate(&[ChangeEvent::changed("/site/style.css")]);
//! if !update.is_unchanged() {
//!     println!("{}", update.css);
//! }
//! ```

mod aggregate;
mod error;
mod ignore;
mod watcher;

pub use aggregate::{ContentUpdate, ErrorHook, ReloadAggregator, BODY_FILE, EMPTY_BODY};
pub use error::{ReloadError, WatchError};
pub use ignore::IgnorePatterns;
pub use watcher::{ChangeEvent, ChangeSource, NotifyWatcher, ReloadConfig};
