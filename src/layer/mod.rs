//! Tower Layer implementations for the dispatch channel

pub mod validation;

pub use validation::{EnvelopeValidationLayer, EnvelopeValidationService};
