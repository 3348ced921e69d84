pub mod employee;
pub mod location;
pub mod submission;
