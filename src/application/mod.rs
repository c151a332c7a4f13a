pub mod catalog;
pub mod error;
pub mod jobs;
pub mod orders;
pub mod repos;
pub mod trash;
