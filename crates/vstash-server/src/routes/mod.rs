pub mod admin;
pub mod files;
