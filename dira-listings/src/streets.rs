use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::models::Street;
use dira_core::schema::streets;
use dira_core::types::{Locale, Neighbourhood};
use dira_core::{AppContext, DomainError};

use crate::service::Caller;

/// One entry of the street picker, localized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetOption {
    pub id: i64,
    pub name: String,
}

/// Streets available in the chosen neighbourhoods, sorted by the
/// localized name so the picker stays alphabetical in both languages.
pub async fn street_options(
    conn: &mut AsyncPgConnection,
    neighbourhoods: &[Neighbourhood],
    locale: Locale,
) -> Result<Vec<StreetOption>, DomainError> {
    let names: Vec<String> = neighbourhoods.iter().map(|n| n.as_str().to_string()).collect();

    let rows: Vec<Street> = streets::table
        .filter(streets::neighbourhood.eq_any(&names))
        .select(Street::as_select())
        .load(conn)
        .await?;

    let mut options: Vec<StreetOption> = rows
        .into_iter()
        .map(|street| StreetOption {
            id: street.id,
            name: street.localized_name(locale).to_string(),
        })
        .collect();
    options.sort_by(|a, b| a.name.cmp(&b.name));
    options.dedup();

    Ok(options)
}

fn require_admin(caller: &Caller) -> Result<(), DomainError> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}

fn validate_street(name_en: &str, name_he: &str) -> Result<(), DomainError> {
    if name_en.trim().is_empty() || name_he.trim().is_empty() {
        return Err(DomainError::validation(
            "name",
            "both English and Hebrew names are required",
        ));
    }
    Ok(())
}

/// Every street row, for the admin table.
pub async fn list_streets(ctx: &AppContext, caller: &Caller) -> Result<Vec<Street>, DomainError> {
    require_admin(caller)?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let rows: Vec<Street> = streets::table
        .order((streets::neighbourhood.asc(), streets::name_en.asc()))
        .select(Street::as_select())
        .load(&mut conn)
        .await?;

    Ok(rows)
}

pub async fn create_street(
    ctx: &AppContext,
    caller: &Caller,
    neighbourhood: Neighbourhood,
    name_en: &str,
    name_he: &str,
) -> Result<Street, DomainError> {
    require_admin(caller)?;
    validate_street(name_en, name_he)?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let street: Street = diesel::insert_into(streets::table)
        .values((
            streets::neighbourhood.eq(neighbourhood.as_str()),
            streets::name_en.eq(name_en.trim()),
            streets::name_he.eq(name_he.trim()),
        ))
        .returning(Street::as_returning())
        .get_result(&mut conn)
        .await?;

    Ok(street)
}

pub async fn update_street(
    ctx: &AppContext,
    caller: &Caller,
    street_id: i64,
    neighbourhood: Neighbourhood,
    name_en: &str,
    name_he: &str,
) -> Result<(), DomainError> {
    require_admin(caller)?;
    validate_street(name_en, name_he)?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let updated = diesel::update(streets::table.filter(streets::id.eq(street_id)))
        .set((
            streets::neighbourhood.eq(neighbourhood.as_str()),
            streets::name_en.eq(name_en.trim()),
            streets::name_he.eq(name_he.trim()),
            streets::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

    if updated == 0 {
        return Err(DomainError::NotFound);
    }
    Ok(())
}

pub async fn delete_street(
    ctx: &AppContext,
    caller: &Caller,
    street_id: i64,
) -> Result<(), DomainError> {
    require_admin(caller)?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let deleted = diesel::delete(streets::table.filter(streets::id.eq(street_id)))
        .execute(&mut conn)
        .await?;

    if deleted == 0 {
        return Err(DomainError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gate() {
        let admin = Caller { user_id: 1, is_admin: true };
        let user = Caller { user_id: 2, is_admin: false };
        assert!(require_admin(&admin).is_ok());
        assert!(matches!(require_admin(&user), Err(DomainError::Forbidden)));
    }

    #[test]
    fn street_names_must_be_present_in_both_locales() {
        assert!(validate_street("Yoel", "יואל").is_ok());
        assert!(validate_street("  ", "יואל").is_err());
        assert!(validate_street("Yoel", "").is_err());
    }
}
