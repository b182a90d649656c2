use axum::extract::{Query, State};
use diesel::prelude::*;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::schema::diecasts;
use crate::state::AppState;
use crate::utils::query::{like_pattern, non_empty};

const AUTOCOMPLETE_LIMIT: i64 = 20;
const CATALOG_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct BrandQuery {
    pub q: Option<String>,
}

/// Distinct brands in use across the collection, for autocomplete.
pub async fn list_brands(
    State(state): State<AppState>,
    Query(params): Query<BrandQuery>,
) -> AppResult<ApiResponse<Vec<String>>> {
    let mut query = diecasts::table
        .select(diecasts::brand)
        .distinct()
        .order(diecasts::brand.asc())
        .into_boxed();

    let limit = match non_empty(params.q) {
        Some(needle) => {
            query = query.filter(diecasts::brand.ilike(like_pattern(needle.trim())));
            AUTOCOMPLETE_LIMIT
        }
        None => CATALOG_LIMIT,
    };

    let mut conn = state.db()?;
    let mut brands: Vec<String> = query.limit(limit).load(&mut conn)?;
    brands.sort();

    Ok(ApiResponse::ok(brands))
}
