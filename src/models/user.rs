use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub firstname: String,
    pub lastname: String,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::map::Entity")]
    Maps,
    #[sea_orm(has_many = "super::activity::Entity")]
    Activities,
}

impl Related<super::map::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Maps.def()
    }
}

impl Related<super::activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Activities.def()
    }
}

/// Walks the `friends` edge table from a user to the users they added.
#[derive(Debug)]
pub struct FriendsLink;

impl Linked for FriendsLink {
    type FromEntity = Entity;
    type ToEntity = Entity;

    fn link(&self) -> Vec<RelationDef> {
        vec![
            super::friend::Relation::User.def().rev(),
            super::friend::Relation::Friend.def(),
        ]
    }
}

impl ActiveModelBehavior for ActiveModel {}
