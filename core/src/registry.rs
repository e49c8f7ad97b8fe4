// dwi-connectome/src/registry.rs

//! Defines `RecipeRegistry`, a finite lookup from `(Species, ShellType)` to the
//! `ProcessingRecipe` that processes that variant.

use crate::acquisition::{ShellType, Species};
use crate::error::{DwiError, DwiResult};
use crate::recipe::ProcessingRecipe;
use std::collections::HashMap;
use tracing::{event, instrument, Level};

/// Registered recipes. A pair that was never registered is a configuration
/// error, never a silent default.
#[derive(Debug, Clone, Default)]
pub struct RecipeRegistry {
  recipes: HashMap<(Species, ShellType), ProcessingRecipe>,
}

impl RecipeRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// The human single- and multi-shell recipes. NHP has no entries.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.register(Species::Human, ShellType::SingleShell, ProcessingRecipe::human_single_shell());
    registry.register(Species::Human, ShellType::MultiShell, ProcessingRecipe::human_multi_shell());
    registry
  }

  /// Registers (or replaces) the recipe for a pair.
  pub fn register(&mut self, species: Species, shell: ShellType, recipe: ProcessingRecipe) {
    event!(Level::DEBUG, %species, %shell, %recipe, "Registering recipe.");
    if let Some(previous) = self.recipes.insert((species, shell), recipe) {
      event!(Level::WARN, %species, %shell, %previous, "Replaced an existing recipe.");
    }
  }

  #[instrument(name = "RecipeRegistry::select", skip(self), err(Display))]
  pub fn select(&self, species: Species, shell: ShellType) -> DwiResult<ProcessingRecipe> {
    let recipe = self.recipes.get(&(species, shell)).copied().ok_or_else(|| {
      let registered: Vec<String> = self
        .recipes
        .keys()
        .map(|(sp, sh)| format!("({}, {})", sp, sh))
        .collect();
      DwiError::configuration(
        "recipe_selection",
        format!(
          "no processing recipe registered for ({}, {}); registered: [{}]",
          species,
          shell,
          registered.join(", ")
        ),
      )
    })?;
    event!(Level::INFO, %recipe, "Processing recipe selected.");
    Ok(recipe)
  }

  pub fn len(&self) -> usize {
    self.recipes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.recipes.is_empty()
  }
}
