//! Resource inventory checks
//!
//! Flows declare which resources they expect terraform to have created, as a
//! list of `(key, ResourceMatchPattern)` pairs. The [`Matcher`] compares them
//! against the resources found in state.

mod matcher;

pub use matcher::{
    ActualResource, AttributeMismatch, CountViolation, MatchOutcome, Matcher,
    ResourceMatchPattern,
};
