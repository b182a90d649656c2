use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use serde::{Deserialize, Serialize};

use crate::schema::sql_types::{Condition as SqlCondition, Status as SqlStatus};
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} '{value}', expected one of: {expected}")]
pub struct InvalidEnumValue {
    kind: &'static str,
    value: String,
    expected: String,
}

impl InvalidEnumValue {
    fn new(kind: &'static str, value: &str, allowed: &[&str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: allowed.join(", "),
        }
    }
}

/// Acquisition state of a model in the collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, AsExpression, FromSqlRow, Serialize, Deserialize,
)]
#[diesel(sql_type = SqlStatus)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    PreOrder,
    #[default]
    Purchased,
    InTransit,
}

impl Status {
    pub const ALL: &'static [&'static str] = &["pre-order", "purchased", "in-transit"];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::PreOrder => "pre-order",
            Status::Purchased => "purchased",
            Status::InTransit => "in-transit",
        }
    }
}

impl FromStr for Status {
    type Err = InvalidEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pre-order" => Ok(Status::PreOrder),
            "purchased" => Ok(Status::Purchased),
            "in-transit" => Ok(Status::InTransit),
            other => Err(InvalidEnumValue::new("status", other, Self::ALL)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<SqlStatus, Pg> for Status {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<SqlStatus, Pg> for Status {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = std::str::from_utf8(bytes.as_bytes())?;
        Ok(raw.parse()?)
    }
}

/// Packaging state of a model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, AsExpression, FromSqlRow, Serialize, Deserialize,
)]
#[diesel(sql_type = SqlCondition)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    #[default]
    Sealed,
    Unboxed,
}

impl Condition {
    pub const ALL: &'static [&'static str] = &["sealed", "unboxed"];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Sealed => "sealed",
            Condition::Unboxed => "unboxed",
        }
    }
}

impl FromStr for Condition {
    type Err = InvalidEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sealed" => Ok(Condition::Sealed),
            "unboxed" => Ok(Condition::Unboxed),
            other => Err(InvalidEnumValue::new("condition", other, Self::ALL)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<SqlCondition, Pg> for Condition {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<SqlCondition, Pg> for Condition {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = std::str::from_utf8(bytes.as_bytes())?;
        Ok(raw.parse()?)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = diecasts)]
pub struct Diecast {
    pub id: i32,
    pub brand: String,
    pub model: String,
    pub scale: Option<String>,
    pub color: Option<String>,
    pub status: Status,
    pub condition: Condition,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = diecasts)]
pub struct NewDiecast {
    pub brand: String,
    pub model: String,
    pub scale: Option<String>,
    pub color: Option<String>,
    pub status: Status,
    pub condition: Condition,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = brands)]
pub struct Brand {
    pub id: i32,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = brands)]
pub struct NewBrand<'a> {
    pub name: &'a str,
}
