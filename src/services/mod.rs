pub mod activity_service;
pub mod geo;
pub mod map_service;
pub mod seed;
pub mod upload_store;
