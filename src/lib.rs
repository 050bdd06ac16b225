pub mod classify;
pub mod geo;
pub mod hop;
pub mod render;
pub mod validation;
