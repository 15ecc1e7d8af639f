pub mod database;
pub mod entities;
pub mod query;
pub mod repositories;
pub mod traits;
pub mod view_cache;
