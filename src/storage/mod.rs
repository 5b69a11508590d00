mod repository;

pub use repository::*;

/// SQL migration for the extraction cache
pub const MIGRATION_001_EXTRACTIONS: &str = include_str!("migrations/001_extractions.sql");
