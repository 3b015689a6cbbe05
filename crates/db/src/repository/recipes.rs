//! Recipe CRUD with soft delete.
//!
//! Rows are never removed. Archiving sets `archived_at`, restoring clears
//! it, and every listing filters on it.

use sqlx::MySqlConnection;

use crate::error::is_unique_violation;
use crate::models::{encode_list, NewRecipe, Recipe, RecipeRow};
use crate::{DbError, DbPool};

macro_rules! select_recipes {
    ($tail:literal) => {
        concat!(
            "SELECT id, title, source_url, description, image_url, servings, ",
            "prep_time, cook_time, total_time, ingredients, instructions, ",
            "archived_at, created_at, updated_at FROM recipes ",
            $tail
        )
    };
}

/// Which recipes [`list_recipes`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// `true` for archived recipes only, `false` for active ones only.
    pub archived: bool,
    /// Case-insensitive substring of the title.
    pub query: Option<String>,
}

fn duplicate_or(err: sqlx::Error, source_url: &str) -> DbError {
    if is_unique_violation(&err) {
        DbError::DuplicateSourceUrl(source_url.to_owned())
    } else {
        DbError::Sqlx(err)
    }
}

/// `%needle%` with LIKE wildcards in `needle` escaped.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn inserted_id(raw: u64) -> Result<i64, DbError> {
    i64::try_from(raw)
        .map_err(|_| DbError::Sqlx(sqlx::Error::Protocol(format!("insert id {raw} out of range"))))
}

async fn fetch_by_id(conn: &mut MySqlConnection, id: i64) -> Result<Option<Recipe>, DbError> {
    let row = sqlx::query_as::<_, RecipeRow>(select_recipes!("WHERE id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Recipe::from))
}

/// Insert a new recipe.
///
/// Returns `DbError::DuplicateSourceUrl` if the source URL was already
/// imported.
pub async fn create_recipe(pool: &DbPool, recipe: &NewRecipe) -> Result<Recipe, DbError> {
    let ingredients = encode_list(&recipe.ingredients)?;
    let instructions = encode_list(&recipe.instructions)?;
    let mut conn = pool.acquire().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO recipes
            (title, source_url, description, image_url, servings,
             prep_time, cook_time, total_time, ingredients, instructions)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&recipe.title)
    .bind(&recipe.source_url)
    .bind(recipe.description.as_deref())
    .bind(recipe.image_url.as_deref())
    .bind(recipe.servings.as_deref())
    .bind(recipe.prep_time.as_deref())
    .bind(recipe.cook_time.as_deref())
    .bind(recipe.total_time.as_deref())
    .bind(&ingredients)
    .bind(&instructions)
    .execute(&mut *conn)
    .await
    .map_err(|err| duplicate_or(err, &recipe.source_url))?;

    let id = inserted_id(result.last_insert_id())?;
    fetch_by_id(&mut conn, id).await?.ok_or(DbError::NotFound)
}

/// Fetch a single recipe by its primary key.
pub async fn get_recipe(pool: &DbPool, id: i64) -> Result<Recipe, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_by_id(&mut conn, id).await?.ok_or(DbError::NotFound)
}

/// Look a recipe up by the URL it was imported from.
pub async fn find_by_source_url(pool: &DbPool, source_url: &str) -> Result<Option<Recipe>, DbError> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query_as::<_, RecipeRow>(select_recipes!("WHERE source_url = ?"))
        .bind(source_url)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Recipe::from))
}

/// Active or archived recipes, newest first.
pub async fn list_recipes(pool: &DbPool, filter: &ListFilter) -> Result<Vec<Recipe>, DbError> {
    let mut conn = pool.acquire().await?;
    let needle = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let rows = match needle {
        Some(needle) => {
            sqlx::query_as::<_, RecipeRow>(select_recipes!(
                "WHERE (archived_at IS NOT NULL) = ? AND LOWER(title) LIKE LOWER(?) \
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(filter.archived)
            .bind(like_pattern(needle))
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, RecipeRow>(select_recipes!(
                "WHERE (archived_at IS NOT NULL) = ? ORDER BY created_at DESC, id DESC"
            ))
            .bind(filter.archived)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    Ok(rows.into_iter().map(Recipe::from).collect())
}

/// Replace the editable fields of an existing recipe.
pub async fn update_recipe(pool: &DbPool, id: i64, recipe: &NewRecipe) -> Result<Recipe, DbError> {
    let ingredients = encode_list(&recipe.ingredients)?;
    let instructions = encode_list(&recipe.instructions)?;
    let mut conn = pool.acquire().await?;

    if fetch_by_id(&mut conn, id).await?.is_none() {
        return Err(DbError::NotFound);
    }

    sqlx::query(
        r#"
        UPDATE recipes
        SET title = ?, source_url = ?, description = ?, image_url = ?, servings = ?,
            prep_time = ?, cook_time = ?, total_time = ?, ingredients = ?, instructions = ?
        WHERE id = ?
        "#,
    )
    .bind(&recipe.title)
    .bind(&recipe.source_url)
    .bind(recipe.description.as_deref())
    .bind(recipe.image_url.as_deref())
    .bind(recipe.servings.as_deref())
    .bind(recipe.prep_time.as_deref())
    .bind(recipe.cook_time.as_deref())
    .bind(recipe.total_time.as_deref())
    .bind(&ingredients)
    .bind(&instructions)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|err| duplicate_or(err, &recipe.source_url))?;

    fetch_by_id(&mut conn, id).await?.ok_or(DbError::NotFound)
}

/// Soft-delete a recipe. Archiving an archived recipe keeps its original
/// timestamp.
pub async fn archive_recipe(pool: &DbPool, id: i64) -> Result<Recipe, DbError> {
    set_archived(
        pool,
        id,
        "UPDATE recipes SET archived_at = CURRENT_TIMESTAMP WHERE id = ? AND archived_at IS NULL",
    )
    .await
}

/// Undo [`archive_recipe`].
pub async fn restore_recipe(pool: &DbPool, id: i64) -> Result<Recipe, DbError> {
    set_archived(
        pool,
        id,
        "UPDATE recipes SET archived_at = NULL WHERE id = ? AND archived_at IS NOT NULL",
    )
    .await
}

async fn set_archived(pool: &DbPool, id: i64, sql: &'static str) -> Result<Recipe, DbError> {
    let mut conn = pool.acquire().await?;
    sqlx::query(sql).bind(id).execute(&mut *conn).await?;
    fetch_by_id(&mut conn, id).await?.ok_or(DbError::NotFound)
}
