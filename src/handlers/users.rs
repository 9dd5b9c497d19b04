use actix_web::{web, HttpResponse};
use sea_orm::*;
use serde::Serialize;

use crate::models::{friend, user};
use crate::utils::errors::ApiError;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub firstname: String,
    pub lastname: String,
    pub username: String,
    pub email: String,
    /// Ids of the users this user has added.
    pub friends: Vec<i32>,
}

async fn user_response(db: &DatabaseConnection, user: user::Model) -> Result<UserResponse, ApiError> {
    let friends = friend::Entity::find()
        .filter(friend::Column::UserId.eq(user.id))
        .order_by_asc(friend::Column::FriendId)
        .all(db)
        .await
        .map_err(ApiError::database)?
        .into_iter()
        .map(|edge| edge.friend_id)
        .collect();

    Ok(UserResponse {
        id: user.id,
        firstname: user.firstname,
        lastname: user.lastname,
        username: user.username,
        email: user.email,
        friends,
    })
}

/// GET /users/:user_id
pub async fn get_user(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let found = user::Entity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(user_response(&db, found).await?))
}

/// POST /users/:user_id/friends/:friend_id
/// Add a one-way friend edge from user to friend
pub async fn add_friend(
    db: web::Data<DatabaseConnection>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, ApiError> {
    let (user_id, friend_id) = path.into_inner();

    if user_id == friend_id {
        return Err(ApiError::bad_request("Users cannot befriend themselves"));
    }

    let owner = user::Entity::find_by_id(user_id)
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let target_exists = user::Entity::find_by_id(friend_id)
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?
        .is_some();
    if !target_exists {
        return Err(ApiError::not_found("Friend not found"));
    }

    let existing = friend::Entity::find_by_id((user_id, friend_id))
        .one(db.get_ref())
        .await
        .map_err(ApiError::database)?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Already friends".to_string()));
    }

    friend::ActiveModel {
        user_id: Set(user_id),
        friend_id: Set(friend_id),
    }
    .insert(db.get_ref())
    .await
    .map_err(ApiError::database)?;

    log::info!("🤝 User {} added user {} as a friend", user_id, friend_id);

    Ok(HttpResponse::Created().json(user_response(&db, owner).await?))
}
