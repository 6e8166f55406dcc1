//! # Workshop - Crafting Recipes as a Ledger Client
//!
//! **Recipes form a Directed Acyclic Graph (DAG)**
//!
//! 1. **No Cycles**: a recipe that would let items be produced from their
//!    own outputs is rejected when added
//! 2. **Transactional**: a craft burns every input and mints every output,
//!    or does nothing
//! 3. **No Duplication**: outputs only exist after inputs are burned
//!
//! The workshop owns no balances. Crafting is a `burn_batch` followed by a
//! `mint_batch` on the [`ItemLedger`].

use std::collections::{HashMap, HashSet, VecDeque};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, EventLog};
use crate::ledger::{ItemKind, ItemLedger, Quantity};

/// Unique identifier for a recipe.
pub type RecipeId = u32;

/// Input or output line of a recipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeItem {
    /// Item kind.
    pub item: ItemKind,
    /// Units consumed or produced per craft.
    pub quantity: u32,
}

impl RecipeItem {
    /// Creates a new recipe line.
    #[inline]
    #[must_use]
    pub const fn new(item: ItemKind, quantity: u32) -> Self {
        Self { item, quantity }
    }
}

/// A crafting recipe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique recipe identifier.
    pub id: RecipeId,
    /// Human-readable name.
    pub name: String,
    /// Items consumed.
    pub inputs: Vec<RecipeItem>,
    /// Items produced.
    pub outputs: Vec<RecipeItem>,
}

impl Recipe {
    /// Creates a new recipe.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the recipe has no inputs or no outputs.
    pub fn new(
        id: RecipeId,
        name: impl Into<String>,
        inputs: Vec<RecipeItem>,
        outputs: Vec<RecipeItem>,
    ) -> BazaarResult<Self> {
        let recipe = Self {
            id,
            name: name.into(),
            inputs,
            outputs,
        };
        recipe.check_shape()?;
        Ok(recipe)
    }

    fn check_shape(&self) -> BazaarResult<()> {
        if self.inputs.is_empty() {
            return Err(BazaarError::invalid(format!("recipe {} must have at least one input", self.id)));
        }
        if self.outputs.is_empty() {
            return Err(BazaarError::invalid(format!("recipe {} must have at least one output", self.id)));
        }
        if self.inputs.iter().chain(&self.outputs).any(|line| line.quantity == 0) {
            return Err(BazaarError::invalid(format!("recipe {} has a zero quantity", self.id)));
        }
        Ok(())
    }

    /// Scales a side of the recipe by `times` into ledger batch arrays.
    fn scaled(lines: &[RecipeItem], times: u32) -> BazaarResult<(Vec<ItemKind>, Vec<Quantity>)> {
        let mut kinds = Vec::with_capacity(lines.len());
        let mut quantities = Vec::with_capacity(lines.len());
        for line in lines {
            kinds.push(line.item);
            quantities.push(
                Quantity::from(line.quantity)
                    .checked_mul(Quantity::from(times))
                    .ok_or(BazaarError::ArithmeticOverflow)?,
            );
        }
        Ok((kinds, quantities))
    }
}

/// Result of a successful craft.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CraftResult {
    /// The recipe that was crafted.
    pub recipe_id: RecipeId,
    /// How many times.
    pub times: u32,
    /// Units produced per kind.
    pub produced: Vec<(ItemKind, Quantity)>,
}

/// The recipe graph.
///
/// Keeps production and consumption indexes so cycle checks never scan
/// every recipe pair.
#[derive(Clone, Debug, Default)]
pub struct Workshop {
    /// All recipes indexed by ID.
    recipes: HashMap<RecipeId, Recipe>,
    /// Item kind to the recipes that produce it.
    item_producers: HashMap<ItemKind, Vec<RecipeId>>,
    /// Item kind to the recipes that consume it.
    item_consumers: HashMap<ItemKind, Vec<RecipeId>>,
}

impl Workshop {
    /// Creates an empty workshop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a recipe by ID.
    #[must_use]
    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    /// Returns the number of recipes.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// Adds a recipe.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` for a duplicate id
    /// - `InvalidArgument` for empty sides or zero quantities
    /// - `NotFound` for an item kind missing from the catalog
    /// - `StateConflict` if the recipe would close a production cycle
    pub fn add_recipe(&mut self, recipe: Recipe, ledger: &ItemLedger, log: &mut EventLog) -> BazaarResult<()> {
        if self.recipes.contains_key(&recipe.id) {
            return Err(BazaarError::exists("recipe", recipe.id));
        }
        recipe.check_shape()?;
        for line in recipe.inputs.iter().chain(&recipe.outputs) {
            ledger.require_kind(line.item)?;
        }

        let id = recipe.id;
        self.index(&recipe);
        self.recipes.insert(id, recipe);

        if self.has_cycle() {
            let chain = self.find_cycle().unwrap_or_default();
            self.unindex(id);
            return Err(BazaarError::conflict(format!(
                "recipe {id} closes a production cycle: {chain:?}"
            )));
        }

        log.emit(BazaarEvent::RecipeAdded { recipe_id: id });
        Ok(())
    }

    /// True if the recipe graph contains a cycle.
    ///
    /// Uses Kahn's algorithm: if a topological sort visits every recipe,
    /// the graph is a DAG. A recipe that consumes its own output (a
    /// catalyst) is not a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        // Edge A -> B if A produces something B consumes
        let mut in_degree: HashMap<RecipeId, usize> = self.recipes.keys().map(|&id| (id, 0)).collect();
        let mut adjacency: HashMap<RecipeId, Vec<RecipeId>> = HashMap::new();

        for (&recipe_id, recipe) in &self.recipes {
            for input in &recipe.inputs {
                let Some(producers) = self.item_producers.get(&input.item) else {
                    continue;
                };
                for &producer_id in producers {
                    if producer_id != recipe_id {
                        adjacency.entry(producer_id).or_default().push(recipe_id);
                        *in_degree.entry(recipe_id).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<RecipeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted_count = 0;
        while let Some(recipe_id) = queue.pop_front() {
            sorted_count += 1;
            for &neighbor in adjacency.get(&recipe_id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        sorted_count != self.recipes.len()
    }

    /// Returns one cycle as a recipe chain whose first and last entries are
    /// the same recipe, or `None` for a DAG.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<RecipeId>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        let mut starts: Vec<RecipeId> = self.recipes.keys().copied().collect();
        starts.sort_unstable();

        for start_id in starts {
            if !visited.contains(&start_id) {
                if let Some(cycle) = self.dfs_find_cycle(start_id, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_find_cycle(
        &self,
        recipe_id: RecipeId,
        visited: &mut HashSet<RecipeId>,
        on_stack: &mut HashSet<RecipeId>,
        path: &mut Vec<RecipeId>,
    ) -> Option<Vec<RecipeId>> {
        visited.insert(recipe_id);
        on_stack.insert(recipe_id);
        path.push(recipe_id);

        if let Some(recipe) = self.recipes.get(&recipe_id) {
            for output in &recipe.outputs {
                let Some(consumers) = self.item_consumers.get(&output.item) else {
                    continue;
                };
                for &consumer_id in consumers {
                    if consumer_id == recipe_id {
                        continue;
                    }
                    if !visited.contains(&consumer_id) {
                        if let Some(cycle) = self.dfs_find_cycle(consumer_id, visited, on_stack, path) {
                            return Some(cycle);
                        }
                    } else if on_stack.contains(&consumer_id) {
                        let cycle_start = path.iter().position(|&id| id == consumer_id).unwrap_or(0);
                        let mut cycle = path[cycle_start..].to_vec();
                        cycle.push(consumer_id);
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        on_stack.remove(&recipe_id);
        None
    }

    /// Applies a recipe `times` times for `crafter`.
    ///
    /// **ATOMIC**: inputs are burned with one `burn_batch` and outputs minted
    /// with one `mint_batch`. If either fails the caller discards both.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for `times == 0`
    /// - `NotFound` for an unknown recipe
    /// - `InsufficientBalance` if the crafter lacks inputs
    pub fn craft(
        &self,
        ledger: &mut ItemLedger,
        crafter: Address,
        recipe_id: RecipeId,
        times: u32,
        log: &mut EventLog,
    ) -> BazaarResult<CraftResult> {
        if times == 0 {
            return Err(BazaarError::invalid("craft count must be positive"));
        }
        let recipe = self
            .recipes
            .get(&recipe_id)
            .ok_or_else(|| BazaarError::not_found("recipe", recipe_id))?;

        let (input_kinds, input_quantities) = Recipe::scaled(&recipe.inputs, times)?;
        let (output_kinds, output_quantities) = Recipe::scaled(&recipe.outputs, times)?;

        ledger.burn_batch(crafter, &input_kinds, &input_quantities, log)?;
        ledger.mint_batch(crafter, &output_kinds, &output_quantities, log)?;

        log.emit(BazaarEvent::ItemCrafted { crafter, recipe_id, times });
        Ok(CraftResult {
            recipe_id,
            times,
            produced: output_kinds.into_iter().zip(output_quantities).collect(),
        })
    }

    fn index(&mut self, recipe: &Recipe) {
        for input in &recipe.inputs {
            self.item_consumers.entry(input.item).or_default().push(recipe.id);
        }
        for output in &recipe.outputs {
            self.item_producers.entry(output.item).or_default().push(recipe.id);
        }
    }

    fn unindex(&mut self, id: RecipeId) {
        self.recipes.remove(&id);
        for ids in self.item_consumers.values_mut().chain(self.item_producers.values_mut()) {
            ids.retain(|&r| r != id);
        }
    }
}
