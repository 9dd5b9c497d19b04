use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{web, HttpResponse};
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::handlers::{file_present, text_value};
use crate::models::{map, user};
use crate::services::geo::Coordinate;
use crate::services::map_service::{MapService, MapUpload};
use crate::services::upload_store::UploadStore;
use crate::utils::config::Config;
use crate::utils::errors::ApiError;
use crate::utils::validators::{missing_fields, parse_page};

#[derive(Debug, Deserialize)]
pub struct MapsQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MapResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_path: String,
    pub user_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub num_points: i32,
    pub uploaded_at: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl MapResponse {
    fn new(model: map::Model, username: String) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            image_path: model.image_path,
            user_id: model.user_id,
            latitude: model.latitude,
            longitude: model.longitude,
            num_points: model.num_points,
            uploaded_at: model.uploaded_at.to_rfc3339(),
            username,
            distance: None,
        }
    }
}

impl From<map::NearbyMap> for MapResponse {
    fn from(row: map::NearbyMap) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image_path: row.image_path,
            user_id: row.user_id,
            latitude: row.latitude,
            longitude: row.longitude,
            num_points: row.num_points,
            uploaded_at: row.uploaded_at.to_rfc3339(),
            username: row.username,
            distance: Some(row.distance),
        }
    }
}

#[derive(Debug, MultipartForm)]
pub struct MapUploadForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub latitude: Option<Text<String>>,
    pub longitude: Option<Text<String>>,
    pub num_points: Option<Text<String>>,
    /// JSON-encoded list of control points.
    pub points: Option<Text<String>>,
    pub image: Option<TempFile>,
}

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
}

fn map_service(db: &DatabaseConnection, config: &Config) -> MapService {
    MapService::new(db.clone(), UploadStore::new(&config.upload_dir))
}

/// GET /maps/nearest?lat=&lon=&page=
/// Maps ordered by distance from the query point, 20 per page
pub async fn nearest_maps(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    query: web::Query<MapsQuery>,
) -> Result<HttpResponse, ApiError> {
    // Existing clients send the latitude as `lon` and the longitude as `lat`.
    let origin = match (
        parse_coordinate(query.lon.as_deref()),
        parse_coordinate(query.lat.as_deref()),
    ) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
        _ => {
            return Err(ApiError::bad_request(
                "Must provide numeric 'lat' and 'lon' query params",
            ))
        }
    };

    let page = parse_page(query.page.as_deref())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let maps = map_service(&db, &config)
        .nearest(origin, page)
        .await
        .map_err(|e| {
            log::error!("Failed to query nearest maps: {:#}", e);
            ApiError::internal("Database error")
        })?;

    let response: Vec<MapResponse> = maps.into_iter().map(MapResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// GET /users/:user_id/maps?lat=&lon=
/// A user's maps, nearest first when both coordinates are given, newest first otherwise
pub async fn user_maps(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    path: web::Path<i32>,
    query: web::Query<MapsQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let service = map_service(&db, &config);

    let origin = match (
        parse_coordinate(query.lat.as_deref()),
        parse_coordinate(query.lon.as_deref()),
    ) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
        _ => None,
    };

    let response: Vec<MapResponse> = match origin {
        Some(origin) => service
            .for_user_by_distance(user_id, origin)
            .await
            .map(|maps| maps.into_iter().map(MapResponse::from).collect::<Vec<_>>()),
        None => service.for_user_newest_first(user_id).await.map(|maps| {
            maps.into_iter()
                .map(|(m, owner)| {
                    let username = owner.map(|u| u.username).unwrap_or_default();
                    MapResponse::new(m, username)
                })
                .collect::<Vec<_>>()
        }),
    }
    .map_err(|e| {
        log::error!("Failed to list maps for user {}: {:#}", user_id, e);
        ApiError::internal("Database error")
    })?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /maps/upload (multipart)
/// Create a map together with its points document and image
pub async fn create_map(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    MultipartForm(form): MultipartForm<MapUploadForm>,
) -> Result<HttpResponse, ApiError> {
    let title = text_value(form.title);
    let latitude = text_value(form.latitude);
    let longitude = text_value(form.longitude);
    let num_points = text_value(form.num_points);
    let points = text_value(form.points);
    let image = form.image.filter(file_present);

    let missing = missing_fields(&[
        ("title", title.is_some()),
        ("latitude", latitude.is_some()),
        ("longitude", longitude.is_some()),
        ("num_points", num_points.is_some()),
        ("points", points.is_some()),
        ("image", image.is_some()),
    ]);
    let (Some(title), Some(latitude), Some(longitude), Some(num_points), Some(points), Some(image)) =
        (title, latitude, longitude, num_points, points, image)
    else {
        log::warn!("❌ Map upload rejected, missing fields: {:?}", missing);
        return Err(ApiError::bad_request(format!(
            "Missing fields: {}",
            missing.join(", ")
        )));
    };

    // TODO: take the owner from an authenticated identity once requests carry one.
    let owner = user::Entity::find_by_id(config.map_owner_id)
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| {
            log::error!("Configured map owner {} does not exist", config.map_owner_id);
            ApiError::internal(format!("Map owner {} does not exist", config.map_owner_id))
        })?;

    let upload = MapUpload {
        title,
        description: text_value(form.description),
        latitude,
        longitude,
        num_points,
        points,
        image: image.file.path().to_path_buf(),
    };

    let created = map_service(&db, &config)
        .create_map(owner.id, upload)
        .await
        .map_err(|e| {
            log::error!("Error during map creation: {:#}", e);
            ApiError::internal(format!("{:#}", e))
        })?;

    Ok(HttpResponse::Created().json(MapResponse::new(created, owner.username)))
}

/// DELETE /maps/:id
/// Delete a map, its image and its points document
pub async fn delete_map(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let map_id = path.into_inner();
    log::info!("Deleting map with ID: {}", map_id);

    let existing = map::Entity::find_by_id(map_id.clone())
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Map not found"))?;

    map_service(&db, &config)
        .delete_map(&existing)
        .await
        .map_err(|e| {
            log::error!("Failed to delete map {}: {:#}", map_id, e);
            ApiError::internal(format!("Failed to delete map: {:#}", e))
        })?;

    Ok(HttpResponse::NoContent().finish())
}
