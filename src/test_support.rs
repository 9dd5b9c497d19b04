//! Shared fixtures for handler tests: a throwaway SQLite database and upload
//! directory, the wired-up app, and a small multipart body builder.

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{test, web, App};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::atomic::{AtomicI64, Ordering};
use tempfile::TempDir;
use uuid::Uuid;

use crate::handlers;
use crate::models::{activity, map, user};
use crate::services::upload_store::UploadStore;
use crate::utils::config::Config;
use crate::utils::db::{create_schema, establish_connection};

pub struct TestContext {
    _dir: TempDir,
    pub db: DatabaseConnection,
    pub config: Config,
}

impl TestContext {
    pub fn store(&self) -> UploadStore {
        UploadStore::new(&self.config.upload_dir)
    }

    /// Number of files in the upload directory, zero if it was never created.
    pub fn upload_dir_entries(&self) -> usize {
        std::fs::read_dir(&self.config.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub async fn setup() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let db = establish_connection(&database_url).await.unwrap();
    create_schema(&db).await.unwrap();

    let config = Config {
        database_url,
        host: "127.0.0.1".to_string(),
        port: 0,
        upload_dir: dir.path().join("uploads"),
        map_owner_id: 1,
        max_upload_bytes: 1024 * 1024,
        cors_allowed_origins: Vec::new(),
        reset_database: false,
        seed_database: false,
    };

    TestContext {
        _dir: dir,
        db,
        config,
    }
}

pub fn test_app(
    ctx: &TestContext,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(ctx.db.clone()))
        .app_data(web::Data::new(ctx.config.clone()))
        .app_data(handlers::multipart_config(&ctx.config))
        .configure(handlers::configure)
}

static CLOCK: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing timestamps so "newest first" orderings are unambiguous.
fn next_instant() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(CLOCK.fetch_add(1, Ordering::SeqCst))
}

pub async fn insert_user(db: &DatabaseConnection, username: &str) -> user::Model {
    user::ActiveModel {
        firstname: Set(username.to_uppercase()),
        lastname: Set("Tester".to_string()),
        username: Set(username.to_string()),
        email: Set(format!("{}@example.com", username)),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_map(db: &DatabaseConnection, user_id: i32, lat: f64, lon: f64) -> map::Model {
    let id = Uuid::new_v4().to_string();
    map::ActiveModel {
        image_path: Set(UploadStore::image_file_name(&id)),
        id: Set(id),
        title: Set(format!("Map at {}, {}", lat, lon)),
        description: Set(None),
        user_id: Set(user_id),
        latitude: Set(lat),
        longitude: Set(lon),
        num_points: Set(4),
        uploaded_at: Set(next_instant()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_activity(
    db: &DatabaseConnection,
    user_id: i32,
    map_id: Option<String>,
    created_at: DateTime<Utc>,
) -> activity::Model {
    activity::ActiveModel {
        title: Set("Run".to_string()),
        description: Set(None),
        user_id: Set(user_id),
        map_id: Set(map_id),
        created_at: Set(created_at),
        distance: Set(Some(1000.0)),
        elapsed_time: Set(Some(600.0)),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

const BOUNDARY: &str = "----trackmapper-test-boundary";

/// Builds a `multipart/form-data` request body part by part.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, contents: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn post(mut self, uri: &str) -> test::TestRequest {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(self.body)
    }
}
