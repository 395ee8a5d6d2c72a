//! # Asset Shim Core
#![allow(unexpected_cfgs)]

//! Asset interception and network-rewrite layer for a third-party generated
//! static page, plus the local server that delivers that page.
//!
//! ## Features
//!
//! - URL classification driven by configurable rule data
//! - Property, attribute and insertion hooks that rewrite or neutralise
//!   resource references before a request is issued
//! - Stylesheet and markup rewriting (rule-level and text-level passes)
//! - Mutation watching for nodes inserted after the initial pass
//! - Synthetic responses for CMS calls on both request surfaces
//! - HTML rewrite middleware and form submission backend (SQLite)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Host page (third-party)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │        Bindings: accessors / setAttribute / fetch        │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌──────────┐  ┌─────────┐  ┌────────┐  │
//! │  │ Bootstrap  │──│Intercept │──│ Network │──│Watcher │  │
//! │  └────────────┘  └──────────┘  └─────────┘  └────────┘  │
//! │        └──────────── Classifier ◄── RuleSet ──┘          │
//! ├─────────────────────────────────────────────────────────┤
//! │   Local server: markup rewrite │ form API │ SQLite store │
//! └─────────────────────────────────────────────────────────┘
//! ```

// Public modules
pub mod api;
pub mod bootstrap;
pub mod classifier;
pub mod dom;
pub mod guard;
pub mod interceptor;
pub mod models;
pub mod network;
pub mod rewriter;
pub mod server;
pub mod storage;
pub mod watcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
