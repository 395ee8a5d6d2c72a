//! Host page model
//!
//! The environment the interception layer is installed into: a document
//! arena, its stylesheets, an event loop, and the table of capability
//! objects ("bindings") through which page script reaches the platform.

pub mod bindings;
pub mod document;
pub mod event_loop;
pub mod page;
pub mod request;
pub mod stylesheet;

pub use bindings::*;
pub use document::*;
pub use event_loop::*;
pub use page::*;
pub use request::*;
pub use stylesheet::*;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("cannot insert {child:?} into {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    #[error("node {0:?} is not a child of the target")]
    NotFound(NodeId),
    #[error("cross-origin stylesheet rules are not accessible")]
    Security,
    #[error("rule index {0} is out of range")]
    IndexSize(usize),
    #[error("failed to parse rule: {0}")]
    Syntax(String),
    #[error("platform does not expose {0}")]
    MissingBinding(String),
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("task queue unavailable")]
    QueueUnavailable,
}
