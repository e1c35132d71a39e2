//! Least-privilege grant resolution.
//!
//! Grants are derived state: [`AccessGrantResolver::resolve`] recomputes them
//! from the topology's wiring edges and the [`RuleTable`], once, after every
//! resource has been described. The resulting [`GrantSet`] is enforced by the
//! in-process store and stream.

mod action;
mod resolver;
mod rules;

pub use action::{AccessLevel, Action};
pub use resolver::{AccessGrantResolver, Grant, GrantSet};
pub use rules::{Role, RuleTable, STORE_READ, STORE_WRITE, STREAM_READ};
