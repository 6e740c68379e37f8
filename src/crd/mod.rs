//! Custom Resource Definitions for the SSP operator

mod ssp;

#[cfg(test)]
mod tests;

pub use ssp::{SpecValidationError, Ssp, SspSpec, SspStatus};
