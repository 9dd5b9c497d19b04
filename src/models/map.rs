use sea_orm::entity::prelude::*;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "maps")]
pub struct Model {
    /// UUID v4 in its hyphenated text form; also the stem of the map's file names.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Empty only between the insert and the image write of the create transaction.
    #[sea_orm(unique)]
    pub image_path: String,
    pub user_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub num_points: i32,
    pub uploaded_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::activity::Entity")]
    Activities,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Activities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A map row joined with its owner's username and a computed distance (km).
#[derive(Clone, Debug, PartialEq, FromQueryResult)]
pub struct NearbyMap {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_path: String,
    pub user_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub num_points: i32,
    pub uploaded_at: ChronoDateTimeUtc,
    pub username: String,
    pub distance: f64,
}
