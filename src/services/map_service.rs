use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, JoinType,
    Order, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{map, user};
use crate::services::geo::{haversine_expr, Coordinate};
use crate::services::upload_store::{UploadStore, WrittenFiles};
use crate::utils::validators::page_offset;

pub const MAPS_PER_PAGE: u64 = 20;

/// Raw form values of a map upload. Numbers are parsed inside the create
/// transaction so a malformed value fails the same way a storage error does.
#[derive(Debug, Clone)]
pub struct MapUpload {
    pub title: String,
    pub description: Option<String>,
    pub latitude: String,
    pub longitude: String,
    pub num_points: String,
    pub points: String,
    /// Spooled image file to copy into the upload directory.
    pub image: PathBuf,
}

pub struct MapService {
    db: DatabaseConnection,
    store: UploadStore,
}

impl MapService {
    pub fn new(db: DatabaseConnection, store: UploadStore) -> Self {
        Self { db, store }
    }

    /// Maps ordered by distance from `origin`, `MAPS_PER_PAGE` at a time.
    /// The owner's username is joined into the same query.
    pub async fn nearest(&self, origin: Coordinate, page: u64) -> Result<Vec<map::NearbyMap>> {
        let Some(offset) = page_offset(page, MAPS_PER_PAGE) else {
            return Ok(Vec::new());
        };

        let maps = Self::with_distance(origin)
            .offset(offset)
            .limit(MAPS_PER_PAGE)
            .into_model::<map::NearbyMap>()
            .all(&self.db)
            .await?;

        Ok(maps)
    }

    /// All maps of one user ordered by distance from `origin`.
    pub async fn for_user_by_distance(
        &self,
        user_id: i32,
        origin: Coordinate,
    ) -> Result<Vec<map::NearbyMap>> {
        let maps = Self::with_distance(origin)
            .filter(map::Column::UserId.eq(user_id))
            .into_model::<map::NearbyMap>()
            .all(&self.db)
            .await?;

        Ok(maps)
    }

    /// All maps of one user, newest first, each paired with its owner.
    pub async fn for_user_newest_first(
        &self,
        user_id: i32,
    ) -> Result<Vec<(map::Model, Option<user::Model>)>> {
        let maps = map::Entity::find()
            .filter(map::Column::UserId.eq(user_id))
            .find_also_related(user::Entity)
            .order_by_desc(map::Column::UploadedAt)
            .all(&self.db)
            .await?;

        Ok(maps)
    }

    fn with_distance(origin: Coordinate) -> sea_orm::Select<map::Entity> {
        let distance = haversine_expr(map::Column::Latitude, map::Column::Longitude, origin);

        map::Entity::find()
            .join(JoinType::InnerJoin, map::Relation::User.def())
            .column_as(user::Column::Username, "username")
            .column_as(distance.clone(), "distance")
            .order_by(distance, Order::Asc)
    }

    /// Insert the map, write `points_<id>.json` and `image_<id>.jpg`, then
    /// record the image path, all inside one transaction. On failure the
    /// transaction is rolled back and any file already written is removed.
    pub async fn create_map(&self, owner_id: i32, upload: MapUpload) -> Result<map::Model> {
        let txn = self.db.begin().await?;
        let mut written = WrittenFiles::default();

        let outcome = match self.insert_with_files(&txn, owner_id, upload, &mut written).await {
            Ok(model) => txn.commit().await.map(|_| model).map_err(anyhow::Error::from),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    log::error!("Failed to roll back map creation: {}", rollback_err);
                }
                Err(e)
            }
        };

        if outcome.is_err() {
            written.discard().await;
        }

        outcome
    }

    async fn insert_with_files(
        &self,
        txn: &DatabaseTransaction,
        owner_id: i32,
        upload: MapUpload,
        written: &mut WrittenFiles,
    ) -> Result<map::Model> {
        let points: serde_json::Value =
            serde_json::from_str(&upload.points).context("points is not valid JSON")?;
        let latitude: f64 = upload
            .latitude
            .trim()
            .parse()
            .with_context(|| format!("invalid latitude '{}'", upload.latitude))?;
        let longitude: f64 = upload
            .longitude
            .trim()
            .parse()
            .with_context(|| format!("invalid longitude '{}'", upload.longitude))?;
        let num_points: i32 = upload
            .num_points
            .trim()
            .parse()
            .with_context(|| format!("invalid num_points '{}'", upload.num_points))?;

        let inserted = map::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            title: Set(upload.title),
            description: Set(upload.description),
            image_path: Set(String::new()),
            user_id: Set(owner_id),
            latitude: Set(latitude),
            longitude: Set(longitude),
            num_points: Set(num_points),
            uploaded_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        let points_name = UploadStore::points_file_name(&inserted.id);
        written.track(self.store.path_for(&points_name));
        self.store
            .write_bytes(&points_name, &serde_json::to_vec(&points)?)
            .await
            .with_context(|| format!("failed to write {}", points_name))?;

        let image_name = UploadStore::image_file_name(&inserted.id);
        written.track(self.store.path_for(&image_name));
        self.store
            .copy_from(&upload.image, &image_name)
            .await
            .with_context(|| format!("failed to write {}", image_name))?;

        let mut active: map::ActiveModel = inserted.into();
        active.image_path = Set(image_name);
        let updated = active.update(txn).await?;

        log::info!(
            "🗺️  Created map {} ({} points) for user {}",
            updated.id,
            updated.num_points,
            owner_id
        );

        Ok(updated)
    }

    /// Remove the map's files, then its row.
    ///
    /// The files go first and are not restored if the row delete fails, so a
    /// failed delete can leave a record without its image and points.
    pub async fn delete_map(&self, model: &map::Model) -> Result<()> {
        for name in [
            UploadStore::image_file_name(&model.id),
            UploadStore::points_file_name(&model.id),
        ] {
            if self.store.remove_if_exists(&name).await? {
                log::info!("🗑️  Removed {}", name);
            }
        }

        let txn = self.db.begin().await?;
        let deleted = map::Entity::delete_by_id(model.id.clone()).exec(&txn).await;

        match deleted {
            Ok(_) => {
                txn.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    log::error!("Failed to roll back map deletion: {}", rollback_err);
                }
                Err(e.into())
            }
        }
    }
}
