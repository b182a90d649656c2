use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{Condition, Diecast, NewDiecast, Status};
use crate::response::ApiResponse;
use crate::schema::diecasts;
use crate::state::AppState;
use crate::utils::json::{classify_nullable, NullableValue};
use crate::utils::query::{non_empty, parse_or_default};

pub const DEFAULT_LIST_LIMIT: i64 = 100;

const NOT_FOUND: &str = "Diecast not found";
const BRAND_MAX: usize = 100;
const MODEL_MAX: usize = 200;
const SCALE_MAX: usize = 20;
const COLOR_MAX: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiecastResponse {
    pub id: i32,
    pub brand: String,
    pub model: String,
    pub scale: Option<String>,
    pub color: Option<String>,
    pub status: Status,
    pub condition: Condition,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Diecast> for DiecastResponse {
    fn from(row: Diecast) -> Self {
        Self {
            id: row.id,
            brand: row.brand,
            model: row.model,
            scale: row.scale,
            color: row.color,
            status: row.status,
            condition: row.condition,
            image_url: row.image_url,
            notes: row.notes,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DiecastListQuery {
    pub status: Option<String>,
    pub condition: Option<String>,
    pub brand: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiecastRequest {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub scale: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = diecasts)]
struct DiecastChangeset {
    brand: Option<String>,
    model: Option<String>,
    scale: Option<Option<String>>,
    color: Option<Option<String>>,
    status: Option<Status>,
    condition: Option<Condition>,
    image_url: Option<Option<String>>,
    notes: Option<Option<String>>,
    updated_at: NaiveDateTime,
}

/// Exact-match filters shared by the list and search endpoints.
#[derive(Debug, Default)]
pub(crate) struct DiecastFilters {
    status: Option<Status>,
    condition: Option<Condition>,
    brand: Option<String>,
}

impl DiecastFilters {
    pub(crate) fn parse(
        status: Option<String>,
        condition: Option<String>,
        brand: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            status: parse_enum(non_empty(status).as_deref())?,
            condition: parse_enum(non_empty(condition).as_deref())?,
            brand: non_empty(brand),
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.status.is_none() && self.condition.is_none() && self.brand.is_none()
    }

    pub(crate) fn apply(
        self,
        mut query: diecasts::BoxedQuery<'static, Pg>,
    ) -> diecasts::BoxedQuery<'static, Pg> {
        if let Some(status) = self.status {
            query = query.filter(diecasts::status.eq(status));
        }
        if let Some(condition) = self.condition {
            query = query.filter(diecasts::condition.eq(condition));
        }
        if let Some(brand) = self.brand {
            query = query.filter(diecasts::brand.eq(brand));
        }
        query
    }
}

pub async fn list_diecasts(
    State(state): State<AppState>,
    Query(params): Query<DiecastListQuery>,
) -> AppResult<ApiResponse<Vec<DiecastResponse>>> {
    let DiecastListQuery {
        status,
        condition,
        brand,
        limit,
        offset,
    } = params;

    let filters = DiecastFilters::parse(status, condition, brand)?;
    let limit = parse_or_default(limit.as_deref(), DEFAULT_LIST_LIMIT);
    let offset = parse_or_default(offset.as_deref(), 0);

    let mut conn = state.db()?;
    let rows: Vec<Diecast> = filters
        .apply(diecasts::table.into_boxed())
        .order((diecasts::created_at.desc(), diecasts::id.desc()))
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(
        rows.into_iter().map(DiecastResponse::from).collect(),
    ))
}

pub async fn create_diecast(
    State(state): State<AppState>,
    payload: Result<Json<CreateDiecastRequest>, JsonRejection>,
) -> AppResult<ApiResponse<DiecastResponse>> {
    let Json(payload) = payload?;

    let (brand, model) = match (non_empty(payload.brand), non_empty(payload.model)) {
        (Some(brand), Some(model)) => (brand, model),
        _ => return Err(AppError::bad_request("Brand and model are required")),
    };
    check_length("brand", &brand, BRAND_MAX)?;
    check_length("model", &model, MODEL_MAX)?;
    if let Some(scale) = payload.scale.as_deref() {
        check_length("scale", scale, SCALE_MAX)?;
    }
    if let Some(color) = payload.color.as_deref() {
        check_length("color", color, COLOR_MAX)?;
    }

    let status: Status = parse_enum(payload.status.as_deref())?.unwrap_or_default();
    let condition: Condition = parse_enum(payload.condition.as_deref())?.unwrap_or_default();

    let now = now_micros();
    let new_diecast = NewDiecast {
        brand,
        model,
        scale: payload.scale,
        color: payload.color,
        status,
        condition,
        image_url: payload.image_url,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
    };

    let mut conn = state.db()?;
    let created: Diecast = diesel::insert_into(diecasts::table)
        .values(&new_diecast)
        .get_result(&mut conn)?;

    info!(
        diecast_id = created.id,
        brand = %created.brand,
        model = %created.model,
        "diecast created"
    );
    Ok(ApiResponse::created(created.into()))
}

pub async fn get_diecast(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<ApiResponse<DiecastResponse>> {
    let id = parse_id(&raw_id)?;
    let mut conn = state.db()?;

    let row: Diecast = diecasts::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    Ok(ApiResponse::ok(row.into()))
}

pub async fn update_diecast(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<ApiResponse<DiecastResponse>> {
    let id = parse_id(&raw_id)?;
    let Json(body) = payload?;
    let body = body
        .as_object()
        .ok_or_else(|| AppError::bad_request("request body must be a JSON object"))?;
    let changes = PendingChanges::from_body(body)?;

    let mut conn = state.db()?;
    let updated = conn.transaction(|conn| {
        let existing: Option<Diecast> = diecasts::table
            .find(id)
            .for_update()
            .first(conn)
            .optional()?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        let changeset = changes.into_changeset(next_updated_at(existing.updated_at, now_micros()));
        let row: Diecast = diesel::update(diecasts::table.find(id))
            .set(&changeset)
            .get_result(conn)?;
        Ok::<_, diesel::result::Error>(Some(row))
    })?;

    let updated = updated.ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    info!(diecast_id = updated.id, "diecast updated");
    Ok(ApiResponse::ok(updated.into()))
}

pub async fn delete_diecast(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<ApiResponse<DiecastResponse>> {
    let id = parse_id(&raw_id)?;
    let mut conn = state.db()?;

    let outcome = conn.transaction(|conn| {
        let deleted: Option<Diecast> = diesel::delete(diecasts::table.find(id))
            .get_result(conn)
            .optional()?;
        let Some(deleted) = deleted else {
            return Ok(None);
        };

        let image_still_used = match deleted.image_url.as_deref() {
            Some(url) => {
                let remaining: i64 = diecasts::table
                    .filter(diecasts::image_url.eq(url))
                    .select(count_star())
                    .first(conn)?;
                remaining > 0
            }
            None => false,
        };
        Ok::<_, diesel::result::Error>(Some((deleted, image_still_used)))
    })?;
    drop(conn);

    let (deleted, image_still_used) = outcome.ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    if !image_still_used {
        if let Some(url) = deleted.image_url.as_deref() {
            remove_stored_image(&state, deleted.id, url).await;
        }
    }

    info!(diecast_id = deleted.id, "diecast deleted");
    Ok(ApiResponse::ok(deleted.into()))
}

/// Removes the image behind `url` when it lives in our bucket. Failures only warn.
async fn remove_stored_image(state: &AppState, diecast_id: i32, url: &str) {
    let Some(path) = state.images.path_from_public_url(url) else {
        return;
    };
    if let Err(err) = state.images.delete_image(&path).await {
        warn!(diecast_id, key = %path, error = %err, "failed to remove diecast image");
    }
}

/// Validated partial update; only keys present in the body are applied.
#[derive(Debug, Default)]
struct PendingChanges {
    brand: Option<String>,
    model: Option<String>,
    scale: Option<Option<String>>,
    color: Option<Option<String>>,
    status: Option<Status>,
    condition: Option<Condition>,
    image_url: Option<Option<String>>,
    notes: Option<Option<String>>,
}

impl PendingChanges {
    fn from_body(body: &Map<String, Value>) -> AppResult<Self> {
        Ok(Self {
            brand: required_text(body, "brand", BRAND_MAX)?,
            model: required_text(body, "model", MODEL_MAX)?,
            scale: optional_text(body, "scale", Some(SCALE_MAX))?,
            color: optional_text(body, "color", Some(COLOR_MAX))?,
            status: required_enum(body, "status")?,
            condition: required_enum(body, "condition")?,
            image_url: optional_text(body, "imageUrl", None)?,
            notes: optional_text(body, "notes", None)?,
        })
    }

    fn into_changeset(self, updated_at: NaiveDateTime) -> DiecastChangeset {
        DiecastChangeset {
            brand: self.brand,
            model: self.model,
            scale: self.scale,
            color: self.color,
            status: self.status,
            condition: self.condition,
            image_url: self.image_url,
            notes: self.notes,
            updated_at,
        }
    }
}

fn classify(body: &Map<String, Value>, field: &str) -> AppResult<NullableValue> {
    classify_nullable(body, field).map_err(AppError::bad_request)
}

fn required_text(body: &Map<String, Value>, field: &str, max: usize) -> AppResult<Option<String>> {
    match classify(body, field)? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(AppError::bad_request(format!("{field} cannot be null"))),
        NullableValue::String(value) => {
            if value.trim().is_empty() {
                return Err(AppError::bad_request(format!("{field} must not be empty")));
            }
            check_length(field, &value, max)?;
            Ok(Some(value))
        }
    }
}

fn optional_text(
    body: &Map<String, Value>,
    field: &str,
    max: Option<usize>,
) -> AppResult<Option<Option<String>>> {
    match classify(body, field)? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => {
            if let Some(max) = max {
                check_length(field, &value, max)?;
            }
            Ok(Some(Some(value)))
        }
    }
}

fn required_enum<T>(body: &Map<String, Value>, field: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match classify(body, field)? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(AppError::bad_request(format!("{field} cannot be null"))),
        NullableValue::String(value) => parse_enum(Some(&value)),
    }
}

fn parse_enum<T>(value: Option<&str>) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| raw.parse::<T>())
        .transpose()
        .map_err(|err| AppError::bad_request(err.to_string()))
}

fn check_length(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub(crate) fn parse_id(raw: &str) -> AppResult<i32> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| AppError::bad_request("Invalid ID"))
}

/// Current time at the database's microsecond precision.
fn now_micros() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

/// Moves `updated_at` forward even when the clock has not advanced past the stored value.
fn next_updated_at(previous: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
