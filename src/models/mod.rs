pub mod activity;
pub mod friend;
pub mod map;
pub mod uploaded_file;
pub mod user;
