pub mod classes;
pub mod clipboard;
pub mod core;
pub mod folders;
pub mod plans;
pub mod setup;
pub mod table;
pub mod templates;
pub mod trash;
