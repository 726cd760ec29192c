pub mod exam;
pub mod submission;
