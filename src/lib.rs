//! Keeps clicking one element of a web page on a fixed interval.
//!
//! A Chrome tab is driven over CDP. The clicker injects a "Config Auto Click"
//! button into every page it runs on; the popup it opens edits the target
//! element id, the URL prefix the clicker is limited to, and the interval.
//! Settings are stored per profile and survive page loads and restarts.

pub mod cli;
pub mod clicker;
pub mod config;
pub mod document;
pub mod host;
pub mod popup;
pub mod scheduler;
pub mod store;
pub mod url_filter;

mod logging;
mod version;

#[cfg(test)]
mod testing;
