//! Great-circle distance (Haversine) in plain Rust and as a SQL expression.

use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, IntoSimpleExpr};
use serde::Serialize;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point in degrees. Out-of-range values are accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Distance between `a` and `b` in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = b.lon.to_radians() - a.lon.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// The same formula as [`haversine_km`], between the row's `lat_col`/`lon_col`
/// and `origin`, built only from `radians`, `sin`, `cos`, `pow`, `sqrt` and
/// `asin` so both SQLite and Postgres can evaluate it in a projection or an
/// `ORDER BY`.
pub fn haversine_expr<C: ColumnTrait>(lat_col: C, lon_col: C, origin: Coordinate) -> SimpleExpr {
    let origin_lat = origin.lat.to_radians();
    let origin_lon = origin.lon.to_radians();

    let row_lat = call("radians", lat_col.into_simple_expr());
    let row_lon = call("radians", lon_col.into_simple_expr());

    let half_dlat = Expr::expr(row_lat.clone()).sub(origin_lat).div(2.0);
    let half_dlon = Expr::expr(row_lon).sub(origin_lon).div(2.0);

    let cos_product = Expr::expr(call("cos", row_lat)).mul(origin_lat.cos());
    let h = Expr::expr(square(call("sin", half_dlat)))
        .add(Expr::expr(cos_product).mul(square(call("sin", half_dlon))));

    Expr::val(2.0 * EARTH_RADIUS_KM).mul(call("asin", call("sqrt", h)))
}

fn call(name: &str, arg: SimpleExpr) -> SimpleExpr {
    Func::cust(Alias::new(name)).arg(arg).into()
}

fn square(expr: SimpleExpr) -> SimpleExpr {
    Func::cust(Alias::new("pow")).args([expr, Expr::val(2.0).into()]).into()
}
