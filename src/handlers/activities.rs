use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{web, HttpResponse};
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::handlers::{file_present, text_value};
use crate::models::{activity, user};
use crate::services::activity_service::{ActivityService, ActivityUpload};
use crate::services::upload_store::UploadStore;
use crate::utils::config::Config;
use crate::utils::errors::ApiError;
use crate::utils::validators::{missing_fields, parse_page};

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub user_id: i32,
    pub map_id: Option<String>,
    pub created_at: String,
    pub distance: Option<f64>,
    pub elapsed_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ActivityResponse {
    fn new(model: activity::Model, username: Option<String>) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            user_id: model.user_id,
            map_id: model.map_id,
            created_at: model.created_at.to_rfc3339(),
            distance: model.distance,
            elapsed_time: model.elapsed_time,
            username,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<String>,
}

#[derive(Debug, MultipartForm)]
pub struct ActivityUploadForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub date: Option<Text<String>>,
    pub user_id: Option<Text<String>>,
    pub map_id: Option<Text<String>>,
    pub distance: Option<Text<String>>,
    pub elapsed_time: Option<Text<String>>,
    pub gpx: Option<TempFile>,
}

async fn find_user(db: &DatabaseConnection, user_id: i32) -> Result<user::Model, ApiError> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

fn activity_service(db: &DatabaseConnection, config: &Config) -> ActivityService {
    ActivityService::new(db.clone(), UploadStore::new(&config.upload_dir))
}

/// POST /activities/upload (multipart)
pub async fn create_activity(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    MultipartForm(form): MultipartForm<ActivityUploadForm>,
) -> Result<HttpResponse, ApiError> {
    let title = text_value(form.title);
    let date = text_value(form.date);
    let user_id = text_value(form.user_id);
    let map_id = text_value(form.map_id);
    let distance = text_value(form.distance);
    let elapsed_time = text_value(form.elapsed_time);
    let gpx = form.gpx.filter(file_present);

    let missing = missing_fields(&[
        ("title", title.is_some()),
        ("date", date.is_some()),
        ("user_id", user_id.is_some()),
        ("map_id", map_id.is_some()),
        ("gpx", gpx.is_some()),
        ("distance", distance.is_some()),
        ("elapsed_time", elapsed_time.is_some()),
    ]);
    let (
        Some(title),
        Some(date),
        Some(user_id),
        Some(map_id),
        Some(gpx),
        Some(distance),
        Some(elapsed_time),
    ) = (title, date, user_id, map_id, gpx, distance, elapsed_time)
    else {
        log::warn!("❌ Activity upload rejected, missing fields: {:?}", missing);
        return Err(ApiError::bad_request(format!(
            "Missing fields: {}",
            missing.join(", ")
        )));
    };

    let upload = ActivityUpload {
        title,
        description: text_value(form.description),
        date,
        user_id,
        map_id,
        distance,
        elapsed_time,
        gpx: gpx.file.path().to_path_buf(),
    };

    let created = activity_service(&db, &config)
        .create_activity(upload)
        .await
        .map_err(|e| {
            log::error!("Error during activity creation: {:#}", e);
            ApiError::internal(format!("{:#}", e))
        })?;

    Ok(HttpResponse::Created().json(ActivityResponse::new(created, None)))
}

/// GET /users/:user_id/activities
pub async fn user_activities(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let owner = find_user(&db, path.into_inner()).await?;

    let activities = activity_service(&db, &config)
        .for_user(&owner)
        .await
        .map_err(|e| {
            log::error!("Failed to list activities for user {}: {:#}", owner.id, e);
            ApiError::internal("Database error")
        })?;

    let response: Vec<ActivityResponse> = activities
        .into_iter()
        .map(|a| ActivityResponse::new(a, Some(owner.username.clone())))
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

/// GET /users/:user_id/friends/activities?page=
/// Feed of the user's own activities and those of everyone they added as a friend
pub async fn friends_activities(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    path: web::Path<i32>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, ApiError> {
    let owner = find_user(&db, path.into_inner()).await?;
    let page = parse_page(query.page.as_deref())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let feed = activity_service(&db, &config)
        .friends_feed(&owner, page)
        .await
        .map_err(|e| {
            log::error!("Failed to load feed for user {}: {:#}", owner.id, e);
            ApiError::internal("Database error")
        })?;

    let response: Vec<ActivityResponse> = feed
        .into_iter()
        .map(|(a, author)| ActivityResponse::new(a, author.map(|u| u.username)))
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::friend;
    use crate::test_support::{
        insert_activity, insert_map, insert_user, setup, test_app, MultipartBody,
    };
    use actix_web::{http::StatusCode, test};
    use chrono::{Duration, Utc};
    use serde_json::Value;

    const GPX: &[u8] = b"<?xml version=\"1.0\"?><gpx version=\"1.1\"></gpx>";

    fn activity_body(user_id: i32, map_id: &str, date: &str) -> MultipartBody {
        MultipartBody::new()
            .text("title", "Morning run")
            .text("date", date)
            .text("user_id", &user_id.to_string())
            .text("map_id", map_id)
            .text("distance", "5234.5")
            .text("elapsed_time", "1800")
            .file("gpx", "track.gpx", "application/gpx+xml", GPX)
    }

    async fn add_edge(db: &DatabaseConnection, from: i32, to: i32) {
        friend::ActiveModel {
            user_id: Set(from),
            friend_id: Set(to),
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[actix_web::test]
    async fn test_create_activity_writes_gpx() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let course = insert_map(&ctx.db, runner.id, 10.0, 20.0).await;
        let app = test::init_service(test_app(&ctx)).await;

        let body = activity_body(runner.id, &course.id, "2024-05-01T07:30:00Z");
        let resp = test::call_service(&app, body.post("/activities/upload").to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let json: Value = test::read_body_json(resp).await;
        let id = json["id"].as_i64().unwrap() as i32;
        assert_eq!(json["map_id"], course.id.as_str());
        assert_eq!(json["distance"], 5234.5);
        assert_eq!(json["elapsed_time"], 1800.0);
        assert!(json["created_at"].as_str().unwrap().starts_with("2024-05-01T07:30:00"));

        let stored = ctx.store().path_for(&UploadStore::gpx_file_name(id));
        assert_eq!(std::fs::read(stored).unwrap(), GPX);
    }

    #[actix_web::test]
    async fn test_create_activity_with_bad_date_leaves_nothing() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let course = insert_map(&ctx.db, runner.id, 10.0, 20.0).await;
        let app = test::init_service(test_app(&ctx)).await;

        let body = activity_body(runner.id, &course.id, "01/05/2024 07:30");
        let resp = test::call_service(&app, body.post("/activities/upload").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: Value = test::read_body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("01/05/2024 07:30"));
        assert_eq!(activity::Entity::find().count(&ctx.db).await.unwrap(), 0);
        assert_eq!(ctx.upload_dir_entries(), 0);
    }

    #[actix_web::test]
    async fn test_create_activity_missing_fields() {
        let ctx = setup().await;
        let app = test::init_service(test_app(&ctx)).await;

        let body = MultipartBody::new()
            .text("title", "No track")
            .text("date", "2024-05-01T07:30:00Z")
            .text("user_id", "1")
            .text("map_id", "abc")
            .text("distance", "10");
        let resp = test::call_service(&app, body.post("/activities/upload").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "Missing fields: gpx, elapsed_time");
    }

    #[actix_web::test]
    async fn test_user_activities() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let other = insert_user(&ctx.db, "other").await;
        let now = Utc::now();
        insert_activity(&ctx.db, runner.id, None, now).await;
        insert_activity(&ctx.db, runner.id, None, now).await;
        insert_activity(&ctx.db, other.id, None, now).await;
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/activities", runner.id))
            .to_request();
        let list: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|a| a["username"] == "runner"));

        let req = test::TestRequest::get().uri("/users/999/activities").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "User not found");
    }

    #[actix_web::test]
    async fn test_feed_without_friends_is_own_activities_newest_first() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let stranger = insert_user(&ctx.db, "stranger").await;
        let now = Utc::now();
        let older = insert_activity(&ctx.db, runner.id, None, now - Duration::days(2)).await;
        let newer = insert_activity(&ctx.db, runner.id, None, now - Duration::hours(1)).await;
        insert_activity(&ctx.db, stranger.id, None, now).await;
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/friends/activities", runner.id))
            .to_request();
        let feed: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<i64> = feed.iter().map(|a| a["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![i64::from(newer.id), i64::from(older.id)]);
    }

    #[actix_web::test]
    async fn test_feed_follows_outgoing_edges_only() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let followed = insert_user(&ctx.db, "followed").await;
        let follower = insert_user(&ctx.db, "follower").await;
        add_edge(&ctx.db, runner.id, followed.id).await;
        add_edge(&ctx.db, follower.id, runner.id).await;

        let now = Utc::now();
        insert_activity(&ctx.db, runner.id, None, now - Duration::hours(3)).await;
        insert_activity(&ctx.db, followed.id, None, now - Duration::hours(1)).await;
        insert_activity(&ctx.db, follower.id, None, now).await;
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/friends/activities?page=1", runner.id))
            .to_request();
        let feed: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        let authors: Vec<&str> = feed.iter().map(|a| a["username"].as_str().unwrap()).collect();
        assert_eq!(authors, vec!["followed", "runner"]);

        // The reverse direction sees both, since the follower's edge points at runner.
        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/friends/activities", follower.id))
            .to_request();
        let feed: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(feed.len(), 2);
    }

    #[actix_web::test]
    async fn test_feed_pages() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let now = Utc::now();
        for i in 0..23 {
            insert_activity(&ctx.db, runner.id, None, now - Duration::minutes(i)).await;
        }
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/friends/activities?page=2", runner.id))
            .to_request();
        let feed: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(feed.len(), 3);
    }

    #[actix_web::test]
    async fn test_feed_huge_page_is_empty() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        insert_activity(&ctx.db, runner.id, None, Utc::now()).await;
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri(&format!(
                "/users/{}/friends/activities?page=9223372036854775807",
                runner.id
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let feed: Vec<Value> = test::read_body_json(resp).await;
        assert!(feed.is_empty());
    }

    #[actix_web::test]
    async fn test_feed_errors() {
        let ctx = setup().await;
        let runner = insert_user(&ctx.db, "runner").await;
        let app = test::init_service(test_app(&ctx)).await;

        let req = test::TestRequest::get()
            .uri("/users/999/friends/activities?page=0")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/users/{}/friends/activities?page=-1", runner.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(
            json["error"],
            "Invalid 'page' parameter, must be a positive integer"
        );
    }
}
