use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::PgConnection;

use crate::models::NewBrand;
use crate::schema::brands;

pub const DEFAULT_BRANDS: &[&str] = &[
    "MINI GT",
    "Tarmac Works",
    "Ignition Model",
    "Hot Wheels",
    "Pop Race",
    "Tomica",
    "Greenlight",
    "Matchbox",
    "Auto World",
    "Johnny Lightning",
];

/// Inserts the default brand list, skipping names that already exist.
/// Returns how many rows were inserted.
pub fn seed_brands(conn: &mut PgConnection) -> Result<usize> {
    let rows: Vec<NewBrand<'_>> = DEFAULT_BRANDS
        .iter()
        .map(|&name| NewBrand { name })
        .collect();

    let inserted = diesel::insert_into(brands::table)
        .values(&rows)
        .on_conflict(brands::name)
        .do_nothing()
        .execute(conn)
        .context("failed to seed brands")?;
    Ok(inserted)
}
