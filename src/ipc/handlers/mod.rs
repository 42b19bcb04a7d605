pub mod assessments;
pub mod clos;
pub mod core;
pub mod courses;
pub mod reports;
pub mod setup;
