//! Benefactor resolution and access decisions for a content hierarchy.
//!
//! A node's permissions come from its benefactor: the nearest ancestor (or
//! the node itself) that carries an access control list. The
//! [`engine::BenefactorResolver`] finds and caches benefactors and repairs
//! the cache when nodes move, and the [`engine::DecisionEngine`] evaluates
//! requests against the benefactor's ACL.

pub mod engine;
pub mod model;
