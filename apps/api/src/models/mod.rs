pub mod generation;
pub mod resume;
