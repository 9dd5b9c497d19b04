//! Synthetic data for local development: users with friend edges, maps with
//! placeholder images and point documents, and activities with GPX tracks.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::raw::{SafeEmail, Username};
use fake::faker::lorem::raw::Sentence;
use fake::faker::name::raw::{FirstName, LastName};
use fake::locales::EN;
use fake::Fake;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use uuid::Uuid;

use crate::models::{activity, friend, map, user};
use crate::services::geo::Coordinate;
use crate::services::upload_store::UploadStore;

const SEED: u64 = 777;
const NUM_USERS: usize = 10;
const MAPS_PER_USER: usize = 3;
const ACTIVITIES_PER_USER: usize = 4;
const MAX_FRIENDS_PER_USER: usize = 3;

/// Attempts at drawing a username or email not handed out yet.
const MAX_UNIQUE_ATTEMPTS: usize = 100;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub friendships: usize,
    pub maps: usize,
    pub activities: usize,
}

/// One control point of a georeferenced map: where it sits on the image and
/// where it is in the world.
#[derive(Debug, Serialize)]
struct CoordPair {
    map: Coordinate,
    real: Coordinate,
}

pub async fn seed_database(db: &DatabaseConnection, store: &UploadStore) -> Result<SeedSummary> {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut summary = SeedSummary::default();
    let txn = db.begin().await?;

    log::info!("🌱 Creating users...");
    let users = create_users(&txn, &mut rng).await?;
    summary.users = users.len();

    log::info!("🌱 Creating friendships...");
    summary.friendships = create_friendships(&txn, &mut rng, &users).await?;

    log::info!("🌱 Creating maps...");
    let mut maps_by_user: Vec<(i32, Vec<String>)> = Vec::with_capacity(users.len());
    for owner in &users {
        let mut ids = Vec::with_capacity(MAPS_PER_USER);
        for _ in 0..MAPS_PER_USER {
            ids.push(create_map(&txn, store, &mut rng, owner.id).await?);
        }
        summary.maps += ids.len();
        maps_by_user.push((owner.id, ids));
    }

    log::info!("🌱 Creating activities...");
    let now = Utc::now();
    for (owner_id, map_ids) in &maps_by_user {
        for _ in 0..ACTIVITIES_PER_USER {
            create_activity(&txn, store, &mut rng, *owner_id, map_ids, now).await?;
            summary.activities += 1;
        }
    }

    txn.commit().await?;
    log::info!("✅ Done seeding the database: {:?}", summary);
    Ok(summary)
}

/// Draw from `generate` until it yields a value not in `taken`.
fn unique(
    taken: &mut HashSet<String>,
    what: &str,
    mut generate: impl FnMut() -> String,
) -> Result<String> {
    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let candidate = generate();
        if taken.insert(candidate.clone()) {
            return Ok(candidate);
        }
    }
    bail!("no unique {} after {} attempts", what, MAX_UNIQUE_ATTEMPTS)
}

async fn create_users(txn: &DatabaseTransaction, rng: &mut ChaCha8Rng) -> Result<Vec<user::Model>> {
    let mut users = Vec::with_capacity(NUM_USERS);
    let mut usernames = HashSet::new();
    let mut emails = HashSet::new();

    for _ in 0..NUM_USERS {
        let firstname: String = FirstName(EN).fake_with_rng(rng);
        let lastname: String = LastName(EN).fake_with_rng(rng);
        let username = unique(&mut usernames, "username", || Username(EN).fake_with_rng(rng))?;
        let email = unique(&mut emails, "email", || SafeEmail(EN).fake_with_rng(rng))?;

        let created = user::ActiveModel {
            firstname: Set(firstname),
            lastname: Set(lastname),
            username: Set(username),
            email: Set(email),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        users.push(created);
    }
    Ok(users)
}

async fn create_friendships(
    txn: &DatabaseTransaction,
    rng: &mut ChaCha8Rng,
    users: &[user::Model],
) -> Result<usize> {
    let mut edges = 0;
    for owner in users {
        let others: Vec<i32> = users
            .iter()
            .filter(|u| u.id != owner.id)
            .map(|u| u.id)
            .collect();

        for friend_id in others.choose_multiple(rng, MAX_FRIENDS_PER_USER.min(others.len())) {
            friend::ActiveModel {
                user_id: Set(owner.id),
                friend_id: Set(*friend_id),
            }
            .insert(txn)
            .await?;
            edges += 1;
        }
    }
    Ok(edges)
}

async fn create_map(
    txn: &DatabaseTransaction,
    store: &UploadStore,
    rng: &mut ChaCha8Rng,
    owner_id: i32,
) -> Result<String> {
    let id = Uuid::from_u128(rng.random()).to_string();
    // Stored swapped, the same way uploads are queried by /maps/nearest.
    let latitude = rng.random_range(-180.0..=180.0);
    let longitude = rng.random_range(-90.0..=90.0);
    let image_name = UploadStore::image_file_name(&id);

    map::ActiveModel {
        id: Set(id.clone()),
        title: Set(sentence(rng, 3)),
        description: Set(Some(sentence(rng, 12))),
        image_path: Set(image_name.clone()),
        user_id: Set(owner_id),
        latitude: Set(latitude),
        longitude: Set(longitude),
        num_points: Set(rng.random_range(50..=500)),
        uploaded_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let image = placeholder_image(rng)?;
    store
        .write_bytes(&image_name, &image)
        .await
        .with_context(|| format!("failed to write {}", image_name))?;

    let points = control_points(rng, Coordinate::new(longitude, latitude));
    let points_name = UploadStore::points_file_name(&id);
    store
        .write_bytes(&points_name, &serde_json::to_vec(&points)?)
        .await
        .with_context(|| format!("failed to write {}", points_name))?;

    Ok(id)
}

async fn create_activity(
    txn: &DatabaseTransaction,
    store: &UploadStore,
    rng: &mut ChaCha8Rng,
    owner_id: i32,
    map_ids: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    let created_at = now - Duration::days(rng.random_range(0..=30));
    let map_id = if rng.random_bool(0.7) {
        map_ids.choose(rng).cloned()
    } else {
        None
    };

    let inserted = activity::ActiveModel {
        title: Set(sentence(rng, 3)),
        description: Set(Some(sentence(rng, 12))),
        user_id: Set(owner_id),
        map_id: Set(map_id),
        created_at: Set(created_at),
        // Metres.
        distance: Set(Some(rng.random::<f64>() * 20_000.0)),
        elapsed_time: Set(Some(f64::from(rng.random_range(3600_i32..=7200)))),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let start = Coordinate::new(
        rng.random_range(-60.0..=60.0),
        rng.random_range(-180.0..=180.0),
    );
    let gpx = synthetic_gpx(rng, &inserted.title, start, created_at);
    let gpx_name = UploadStore::gpx_file_name(inserted.id);
    store
        .write_bytes(&gpx_name, gpx.as_bytes())
        .await
        .with_context(|| format!("failed to write {}", gpx_name))?;

    Ok(())
}

fn sentence(rng: &mut ChaCha8Rng, words: usize) -> String {
    Sentence(EN, words..words + 1).fake_with_rng(rng)
}

fn placeholder_image(rng: &mut ChaCha8Rng) -> Result<Vec<u8>> {
    let tint: [u8; 3] = rng.random();
    let img = RgbImage::from_fn(64, 64, |x, y| {
        let shade = ((x + y) * 2) as u8;
        Rgb([
            tint[0].wrapping_add(shade),
            tint[1].wrapping_add(shade),
            tint[2],
        ])
    });

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Jpeg(80))
        .context("failed to encode placeholder image")?;
    Ok(buf.into_inner())
}

fn control_points(rng: &mut ChaCha8Rng, center: Coordinate) -> Vec<CoordPair> {
    [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]
        .into_iter()
        .map(|(x, y)| CoordPair {
            map: Coordinate::new(y, x),
            real: Coordinate::new(
                center.lat + rng.random_range(-0.01..=0.01),
                center.lon + rng.random_range(-0.01..=0.01),
            ),
        })
        .collect()
}

fn synthetic_gpx(
    rng: &mut ChaCha8Rng,
    name: &str,
    start: Coordinate,
    started_at: DateTime<Utc>,
) -> String {
    let mut points = String::new();
    let mut here = start;
    for i in 0..20 {
        here.lat += rng.random_range(-0.0005..=0.0005);
        here.lon += rng.random_range(-0.0005..=0.0005);
        let at = started_at + Duration::seconds(i * 30);
        points.push_str(&format!(
            "      <trkpt lat=\"{:.6}\" lon=\"{:.6}\"><time>{}</time></trkpt>\n",
            here.lat,
            here.lon,
            at.format("%Y-%m-%dT%H:%M:%SZ")
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gpx version=\"1.1\" creator=\"trackmapper-seed\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n  \
         <trk>\n    <name>{}</name>\n    <trkseg>\n{}    </trkseg>\n  </trk>\n</gpx>\n",
        name, points
    )
}
