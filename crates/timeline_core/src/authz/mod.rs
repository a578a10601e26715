//! Request-scoped capability context and authorization seam.
//!
//! The timeline core never decides policy itself; it threads the caller's
//! claim set to an [`evaluator::Authorizer`] before every operation.

pub mod claims;
pub mod evaluator;
