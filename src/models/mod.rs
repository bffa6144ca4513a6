pub mod file_entry;
pub mod history;
pub mod plan;
