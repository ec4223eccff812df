// Shared request, result and error types

pub mod errors;
pub mod upload;
