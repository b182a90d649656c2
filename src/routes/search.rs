use axum::extract::{Query, State};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::debug;

use super::diecasts::{DiecastFilters, DiecastResponse};
use crate::error::{AppError, AppResult};
use crate::models::Diecast;
use crate::response::ApiResponse;
use crate::schema::diecasts;
use crate::state::AppState;
use crate::utils::query::{like_pattern, non_empty};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub condition: Option<String>,
    pub brand: Option<String>,
}

/// Text search over brand, model and color, narrowed by exact-match filters.
/// Returns every match, newest first.
pub async fn search_diecasts(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<ApiResponse<Vec<DiecastResponse>>> {
    let SearchQuery {
        q,
        status,
        condition,
        brand,
    } = params;

    let text = non_empty(q);
    let filters = DiecastFilters::parse(status, condition, brand)?;
    if text.is_none() && filters.is_empty() {
        return Err(AppError::bad_request("Search query or filter required"));
    }

    let mut query = diecasts::table.into_boxed();
    if let Some(text) = text.as_deref() {
        debug!(query = %text, "searching diecasts");
        let pattern = like_pattern(text.trim());
        query = query.filter(
            diecasts::brand
                .ilike(pattern.clone())
                .or(diecasts::model.ilike(pattern.clone()))
                .or(diecasts::color.ilike(pattern)),
        );
    }

    let mut conn = state.db()?;
    let rows: Vec<Diecast> = filters
        .apply(query)
        .order((diecasts::created_at.desc(), diecasts::id.desc()))
        .load(&mut conn)?;

    Ok(ApiResponse::ok(
        rows.into_iter().map(DiecastResponse::from).collect(),
    ))
}
