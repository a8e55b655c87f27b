use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::meal_type::MealType;

/// One food entry in the plan, attached to a meal type by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealItem {
    pub id: Uuid,
    pub meal_type_id: Uuid,
    pub food_ref: String,
    pub quantity: f64,
    pub unit: String,
}

impl MealItem {
    pub fn new(
        meal_type_id: Uuid,
        food_ref: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            meal_type_id,
            food_ref: food_ref.into(),
            quantity,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for MealItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.quantity, self.unit, self.food_ref)
    }
}

/// The user's whole diet plan. Conflicts are resolved at this granularity.
///
/// Items whose `meal_type_id` no longer matches a meal type are orphaned; they
/// are kept and shown, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietRecord {
    pub id: Uuid,
    pub meal_types: Vec<MealType>,
    pub meal_items: Vec<MealItem>,
}

impl DietRecord {
    /// Creates a record with the default meal types and no items.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            meal_types: MealType::defaults(),
            meal_items: Vec::new(),
        }
    }

    pub fn meal_type(&self, id: Uuid) -> Option<&MealType> {
        self.meal_types.iter().find(|m| m.id == id)
    }

    /// Looks a meal type up by id or, case-insensitively, by name.
    pub fn find_meal_type(&self, reference: &str) -> Option<&MealType> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return self.meal_type(id);
        }
        self.meal_types
            .iter()
            .find(|m| m.name.to_lowercase() == reference.to_lowercase())
    }

    pub fn meal_types_in_order(&self) -> Vec<&MealType> {
        let mut types: Vec<&MealType> = self.meal_types.iter().collect();
        types.sort_by_key(|m| m.display_order);
        types
    }

    pub fn items_for(&self, meal_type_id: Uuid) -> impl Iterator<Item = &MealItem> {
        self.meal_items
            .iter()
            .filter(move |item| item.meal_type_id == meal_type_id)
    }

    pub fn orphaned_items(&self) -> Vec<&MealItem> {
        self.meal_items
            .iter()
            .filter(|item| self.meal_type(item.meal_type_id).is_none())
            .collect()
    }

    pub fn next_display_order(&self) -> i32 {
        self.meal_types
            .iter()
            .map(|m| m.display_order.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Removes a meal type. Its items stay in the record as orphans.
    pub fn remove_meal_type(&mut self, id: Uuid) -> Option<MealType> {
        let index = self.meal_types.iter().position(|m| m.id == id)?;
        Some(self.meal_types.remove(index))
    }

    pub fn remove_item(&mut self, id: Uuid) -> Option<MealItem> {
        let index = self.meal_items.iter().position(|i| i.id == id)?;
        Some(self.meal_items.remove(index))
    }
}

impl Default for DietRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DietRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for meal_type in self.meal_types_in_order() {
            writeln!(f, "{}", meal_type)?;
            let mut empty = true;
            for item in self.items_for(meal_type.id) {
                writeln!(f, "  - {}", item)?;
                empty = false;
            }
            if empty {
                writeln!(f, "  (vazio)")?;
            }
        }

        let orphans = self.orphaned_items();
        if !orphans.is_empty() {
            writeln!(f, "Itens sem tipo de refeição")?;
            for item in orphans {
                writeln!(f, "  - {} [{}]", item, item.meal_type_id)?;
            }
        }

        Ok(())
    }
}
