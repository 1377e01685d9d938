//! Role/permission guards: rule definitions, the access evaluator, and the fallback resolver.
//!
//! Everything here is pure: identical `(user, rule)` inputs always produce the same answer,
//! and absent or malformed input degrades to "deny" instead of failing.

pub mod evaluator;
pub mod fallback;
pub mod rule;

pub use evaluator::*;
pub use fallback::*;
pub use rule::*;
