pub mod file_service;
pub mod navigator;
pub mod search_service;
