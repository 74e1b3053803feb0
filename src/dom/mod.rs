//! Element handles and how they are found
//!
//! This module provides the lazy, re-resolving view of the page's elements:
//! - NodeHandle: a locator chain from a page root, resolved again on every access
//! - ElementHandle: a single element with interaction and state operations
//! - ElementCollection: every element matching a locator, re-counted on every access
//! - Locator: immutable, mergeable description of how to find an element
//! - ElementKind: the concrete kind an element is promoted to from its live tag

pub mod collection;
pub mod element;
pub mod geometry;
pub mod kind;
pub mod locator;
pub mod node;

pub use collection::ElementCollection;
pub use element::{DragAndDrop, Element, ElementHandle};
pub use geometry::{Point, Rect, Size};
pub use kind::ElementKind;
pub use locator::Locator;
pub use node::{Node, NodeHandle};
