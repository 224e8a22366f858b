pub mod project;
pub mod report;
pub mod schema;
pub mod submission;
