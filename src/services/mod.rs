pub mod exam_backend;
pub mod submission;
