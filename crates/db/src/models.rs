//! Row structs that map 1-to-1 onto the `recipes` table, and the decoded
//! view callers work with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::DbError;

// ---------------------------------------------------------------------------
// recipes
// ---------------------------------------------------------------------------

/// A persisted recipe row, list columns still serialized.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub title: String,
    pub source_url: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub servings: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    /// JSON array of strings.
    pub ingredients: Option<String>,
    /// JSON array of strings.
    pub instructions: Option<String>,
    /// `NULL` means active.
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A recipe with its ingredient and instruction lists decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub source_url: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub servings: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Recipe {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            source_url: row.source_url,
            description: row.description,
            image_url: row.image_url,
            servings: row.servings,
            prep_time: row.prep_time,
            cook_time: row.cook_time,
            total_time: row.total_time,
            ingredients: decode_list(row.ingredients.as_deref()),
            instructions: decode_list(row.instructions.as_deref()),
            archived_at: row.archived_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields supplied on import or edit. Ids and timestamps are assigned by
/// the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub title: String,
    pub source_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub servings: Option<String>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

// ---------------------------------------------------------------------------
// List columns
// ---------------------------------------------------------------------------

/// Serialize an ordered list into its long-text column form.
pub fn encode_list(items: &[String]) -> Result<String, DbError> {
    Ok(serde_json::to_string(items)?)
}

/// Decode a list column.
///
/// `NULL` and blank values are empty lists. Values that are not a JSON
/// string array (rows written before the column held JSON) are split on
/// newlines.
pub fn decode_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_survive_the_column_encoding() {
        let items = vec!["2 eggs".to_owned(), "1 cup \"strong\" flour".to_owned()];
        let encoded = encode_list(&items).unwrap();
        assert_eq!(decode_list(Some(&encoded)), items);
    }

    #[test]
    fn null_and_blank_columns_are_empty() {
        assert!(decode_list(None).is_empty());
        assert!(decode_list(Some("   ")).is_empty());
        assert!(decode_list(Some("[]")).is_empty());
    }

    #[test]
    fn legacy_plain_text_is_split_into_lines() {
        let decoded = decode_list(Some("Preheat oven\n\n  Mix dry ingredients \nBake"));
        assert_eq!(decoded, vec!["Preheat oven", "Mix dry ingredients", "Bake"]);
    }

    #[test]
    fn row_conversion_decodes_lists_and_tracks_archival() {
        let row = RecipeRow {
            id: 3,
            title: "Shakshuka".into(),
            source_url: "https://example.com/shakshuka".into(),
            description: None,
            image_url: None,
            servings: Some("4".into()),
            prep_time: None,
            cook_time: None,
            total_time: None,
            ingredients: Some(r#"["eggs","tomatoes"]"#.into()),
            instructions: None,
            archived_at: Some(Utc::now()),
            created_at: None,
            updated_at: None,
        };
        let recipe = Recipe::from(row);
        assert_eq!(recipe.ingredients, vec!["eggs", "tomatoes"]);
        assert!(recipe.instructions.is_empty());
        assert!(recipe.is_archived());
    }
}
