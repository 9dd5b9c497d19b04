pub mod activities;
pub mod files;
pub mod maps;
pub mod users;

use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartFormConfig};
use actix_web::web;

use crate::utils::config::Config;

/// Register every route of the API.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/upload", web::post().to(files::upload_file))
        .route("/download/{filename}", web::get().to(files::download_file))
        .service(
            web::scope("/maps")
                .route("/nearest", web::get().to(maps::nearest_maps))
                .route("/upload", web::post().to(maps::create_map))
                .route("/{id}", web::delete().to(maps::delete_map)),
        )
        .service(
            web::scope("/activities")
                .route("/upload", web::post().to(activities::create_activity)),
        )
        .service(
            web::scope("/users")
                .route("/{user_id}", web::get().to(users::get_user))
                .route("/{user_id}/maps", web::get().to(maps::user_maps))
                .route(
                    "/{user_id}/activities",
                    web::get().to(activities::user_activities),
                )
                .route(
                    "/{user_id}/friends/activities",
                    web::get().to(activities::friends_activities),
                )
                .route(
                    "/{user_id}/friends/{friend_id}",
                    web::post().to(users::add_friend),
                ),
        );
}

pub fn multipart_config(config: &Config) -> MultipartFormConfig {
    MultipartFormConfig::default()
        .total_limit(config.max_upload_bytes)
        .memory_limit(config.max_upload_bytes)
}

/// Form value, `None` when absent or empty. Whitespace counts as a value.
pub(crate) fn text_value(field: Option<Text<String>>) -> Option<String> {
    field.map(|text| text.0).filter(|v| !v.is_empty())
}

/// A file part counts as present only when the client named a file.
pub(crate) fn file_present(file: &TempFile) -> bool {
    file.file_name.as_deref().is_some_and(|name| !name.is_empty())
}
