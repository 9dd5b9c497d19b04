use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::path::PathBuf;

use crate::models::{activity, user};
use crate::services::upload_store::{UploadStore, WrittenFiles};
use crate::utils::validators::page_offset;

pub const ACTIVITIES_PER_PAGE: u64 = 20;
pub const ACTIVITY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Raw form values of an activity upload, parsed inside the create transaction.
#[derive(Debug, Clone)]
pub struct ActivityUpload {
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub user_id: String,
    pub map_id: String,
    pub distance: String,
    pub elapsed_time: String,
    /// Spooled GPX file to copy into the upload directory.
    pub gpx: PathBuf,
}

pub struct ActivityService {
    db: DatabaseConnection,
    store: UploadStore,
}

impl ActivityService {
    pub fn new(db: DatabaseConnection, store: UploadStore) -> Self {
        Self { db, store }
    }

    /// Insert the activity and write `gpx_<id>.gpx` in one transaction.
    /// On failure the row is rolled back and a GPX file already written is removed.
    pub async fn create_activity(&self, upload: ActivityUpload) -> Result<activity::Model> {
        let txn = self.db.begin().await?;
        let mut written = WrittenFiles::default();

        let outcome = match self.insert_with_gpx(&txn, upload, &mut written).await {
            Ok(model) => txn.commit().await.map(|_| model).map_err(anyhow::Error::from),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    log::error!("Failed to roll back activity creation: {}", rollback_err);
                }
                Err(e)
            }
        };

        if outcome.is_err() {
            written.discard().await;
        }

        outcome
    }

    async fn insert_with_gpx(
        &self,
        txn: &DatabaseTransaction,
        upload: ActivityUpload,
        written: &mut WrittenFiles,
    ) -> Result<activity::Model> {
        let created_at = NaiveDateTime::parse_from_str(&upload.date, ACTIVITY_DATE_FORMAT)
            .with_context(|| {
                format!(
                    "date '{}' does not match format '{}'",
                    upload.date, ACTIVITY_DATE_FORMAT
                )
            })?
            .and_utc();
        let user_id: i32 = upload
            .user_id
            .trim()
            .parse()
            .with_context(|| format!("invalid user_id '{}'", upload.user_id))?;
        let distance: f64 = upload
            .distance
            .trim()
            .parse()
            .with_context(|| format!("invalid distance '{}'", upload.distance))?;
        let elapsed_time: f64 = upload
            .elapsed_time
            .trim()
            .parse()
            .with_context(|| format!("invalid elapsed_time '{}'", upload.elapsed_time))?;

        let inserted = activity::ActiveModel {
            title: Set(upload.title),
            description: Set(upload.description),
            user_id: Set(user_id),
            map_id: Set(Some(upload.map_id)),
            created_at: Set(created_at),
            distance: Set(Some(distance)),
            elapsed_time: Set(Some(elapsed_time)),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        let gpx_name = UploadStore::gpx_file_name(inserted.id);
        written.track(self.store.path_for(&gpx_name));
        self.store
            .copy_from(&upload.gpx, &gpx_name)
            .await
            .with_context(|| format!("failed to write {}", gpx_name))?;

        log::info!(
            "🏃 Created activity {} for user {}",
            inserted.id,
            inserted.user_id
        );

        Ok(inserted)
    }

    pub async fn for_user(&self, owner: &user::Model) -> Result<Vec<activity::Model>> {
        let activities = owner
            .find_related(activity::Entity)
            .order_by_asc(activity::Column::Id)
            .all(&self.db)
            .await?;

        Ok(activities)
    }

    /// Newest-first activities of `owner` and everyone `owner` has added as a
    /// friend, `ACTIVITIES_PER_PAGE` at a time.
    pub async fn friends_feed(
        &self,
        owner: &user::Model,
        page: u64,
    ) -> Result<Vec<(activity::Model, Option<user::Model>)>> {
        let Some(offset) = page_offset(page, ACTIVITIES_PER_PAGE) else {
            return Ok(Vec::new());
        };

        let mut member_ids: Vec<i32> = owner
            .find_linked(user::FriendsLink)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|friend| friend.id)
            .collect();
        member_ids.push(owner.id);

        let feed = activity::Entity::find()
            .filter(activity::Column::UserId.is_in(member_ids))
            .find_also_related(user::Entity)
            .order_by_desc(activity::Column::CreatedAt)
            .order_by_desc(activity::Column::Id)
            .offset(offset)
            .limit(ACTIVITIES_PER_PAGE)
            .all(&self.db)
            .await?;

        Ok(feed)
    }
}
