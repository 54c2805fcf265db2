#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Recipe-driven combination of turrets with consumable items.
//!
//! A [`Recipe`] maps a (turret kind, item kind) pair to the turret kind that
//! replaces the consumed turret. Matching is by kind-or-specialization, and the first
//! matching recipe of a [`RecipeBook`] wins, so books list specific recipes
//! before general ones.

use cafe_defence_core::{ItemKind, Kind, ParseKindError, TurretKind};
use log::error;
use serde::Deserialize;

/// Static rule combining a turret with an item.
///
/// Fields are optional so malformed authoring data survives loading; an
/// incomplete recipe never matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recipe {
    base: Option<TurretKind>,
    required: Option<ItemKind>,
    result: Option<TurretKind>,
}

impl Recipe {
    /// Creates a complete recipe.
    #[must_use]
    pub const fn new(base: TurretKind, required: ItemKind, result: TurretKind) -> Self {
        Self {
            base: Some(base),
            required: Some(required),
            result: Some(result),
        }
    }

    /// Turret kind the recipe accepts, including its specializations.
    #[must_use]
    pub const fn base(&self) -> Option<TurretKind> {
        self.base
    }

    /// Item kind the recipe consumes, including its specializations.
    #[must_use]
    pub const fn required(&self) -> Option<ItemKind> {
        self.required
    }

    /// Turret kind produced by the recipe.
    #[must_use]
    pub const fn result(&self) -> Option<TurretKind> {
        self.result
    }

    /// Reports whether every field references a kind.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.base.is_some() && self.required.is_some() && self.result.is_some()
    }
}

/// Reports whether `recipe` accepts the turret and item kinds.
#[must_use]
pub fn matches(turret: TurretKind, item: ItemKind, recipe: &Recipe) -> bool {
    match (recipe.base, recipe.required, recipe.result) {
        (Some(base), Some(required), Some(_)) => turret.is_a(base) && item.is_a(required),
        _ => false,
    }
}

/// Result kind of the first recipe accepting the pair.
#[must_use]
pub fn resolve(turret: TurretKind, item: ItemKind, recipes: &[Recipe]) -> Option<TurretKind> {
    recipes
        .iter()
        .find(|recipe| matches(turret, item, recipe))
        .and_then(Recipe::result)
}

/// Configuration errors found while loading recipes.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    /// The document is not valid TOML or does not fit the schema.
    #[error("failed to parse recipe document: {0}")]
    Parse(#[from] toml::de::Error),
    /// A recipe omits one of its fields.
    #[error("recipe {index} has no `{field}`")]
    MissingField {
        /// Position of the recipe in the document.
        index: usize,
        /// Name of the missing field.
        field: &'static str,
    },
    /// A recipe names a kind that does not exist.
    #[error("recipe {index}: {source}")]
    UnknownKind {
        /// Position of the recipe in the document.
        index: usize,
        /// Parse failure of the kind name.
        source: ParseKindError,
    },
}

/// Ordered, read-only recipe list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl Default for RecipeBook {
    fn default() -> Self {
        Self::new(vec![
            Recipe::new(TurretKind::Cannon, ItemKind::Boost, TurretKind::HeavyCannon),
            Recipe::new(TurretKind::Basic, ItemKind::Boost, TurretKind::Cannon),
            Recipe::new(TurretKind::Basic, ItemKind::Ice, TurretKind::Frost),
            Recipe::new(TurretKind::Basic, ItemKind::Scope, TurretKind::Sniper),
            Recipe::new(TurretKind::Basic, ItemKind::Scrap, TurretKind::Rapid),
        ])
    }
}

impl RecipeBook {
    /// Creates a book from recipes in priority order.
    #[must_use]
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    /// Recipes in priority order.
    #[must_use]
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Reports whether some recipe accepts the pair.
    #[must_use]
    pub fn can_combine(&self, turret: TurretKind, item: ItemKind) -> bool {
        self.resolve(turret, item).is_some()
    }

    /// Result kind of the first recipe accepting the pair.
    #[must_use]
    pub fn resolve(&self, turret: TurretKind, item: ItemKind) -> Option<TurretKind> {
        resolve(turret, item, &self.recipes)
    }

    /// Parses a recipe book from TOML.
    ///
    /// Only an unparsable document is an error. Individual recipes with
    /// missing fields or unknown kinds are logged and kept in place as
    /// incomplete recipes that never match.
    pub fn from_toml_str(contents: &str) -> Result<Self, RecipeError> {
        let document: RecipeDocument = toml::from_str(contents)?;
        let mut recipes = Vec::with_capacity(document.recipes.len());
        for (index, entry) in document.recipes.into_iter().enumerate() {
            let (recipe, problems) = entry.into_recipe(index);
            for problem in problems {
                error!("{problem}; the recipe will never match");
            }
            recipes.push(recipe);
        }
        Ok(Self::new(recipes))
    }
}

#[derive(Debug, Deserialize)]
struct RecipeDocument {
    #[serde(default)]
    recipes: Vec<RecipeEntry>,
}

#[derive(Debug, Deserialize)]
struct RecipeEntry {
    base: Option<String>,
    item: Option<String>,
    result: Option<String>,
}

impl RecipeEntry {
    fn into_recipe(self, index: usize) -> (Recipe, Vec<RecipeError>) {
        let mut problems = Vec::new();
        let base = parse_field::<TurretKind>(index, "base", self.base, &mut problems);
        let required = parse_field::<ItemKind>(index, "item", self.item, &mut problems);
        let result = parse_field::<TurretKind>(index, "result", self.result, &mut problems);
        (
            Recipe {
                base,
                required,
                result,
            },
            problems,
        )
    }
}

fn parse_field<K: Kind>(
    index: usize,
    field: &'static str,
    value: Option<String>,
    problems: &mut Vec<RecipeError>,
) -> Option<K> {
    let Some(name) = value else {
        problems.push(RecipeError::MissingField { index, field });
        return None;
    };
    match K::from_name(&name) {
        Ok(kind) => Some(kind),
        Err(source) => {
            problems.push(RecipeError::UnknownKind { index, source });
            None
        }
    }
}
