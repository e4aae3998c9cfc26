pub mod app_extractors;
pub mod auth_extractor;
