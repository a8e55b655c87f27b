use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{Context, OutputFormat};
use dietsync::models::{Color, MealItem, MealType};

#[derive(Args)]
pub struct DietCommand {
    #[command(subcommand)]
    pub command: DietSubcommand,
}

#[derive(Subcommand)]
pub enum DietSubcommand {
    /// Show the diet, grouped by meal type
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add a meal type
    AddType {
        /// Name of the meal type
        #[arg(long)]
        name: String,

        /// Icon (usually an emoji)
        #[arg(long)]
        icon: String,

        /// Color as #RRGGBB
        #[arg(long)]
        color: Color,

        /// Position among meal types (default: last)
        #[arg(long)]
        order: Option<i32>,
    },

    /// Remove a meal type. Its items are kept as orphans.
    RemoveType {
        /// Meal type ID (UUID) or name
        identifier: String,
    },

    /// Add an item to a meal type
    AddItem {
        /// Meal type ID (UUID) or name
        #[arg(long = "type", value_name = "TYPE")]
        meal_type: String,

        /// Food reference
        #[arg(long)]
        food: String,

        /// Quantity (amount)
        #[arg(long)]
        quantity: f64,

        /// Unit of measurement
        #[arg(long)]
        unit: String,
    },

    /// Remove an item
    RemoveItem {
        /// Item ID (UUID)
        id: Uuid,
    },
}

impl DietCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DietSubcommand::Show { format } => {
                let record = match &ctx.orchestrator {
                    Some(orchestrator) => orchestrator.finalized_record(ctx.user_id()).await?,
                    None => ctx.store.load_record(ctx.user_id()).await?,
                };

                let Some(record) = record else {
                    println!("No diet yet. Add a meal type or an item to create one.");
                    return Ok(());
                };

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", record);
                    }
                }
                Ok(())
            }

            DietSubcommand::AddType {
                name,
                icon,
                color,
                order,
            } => {
                if name.trim().is_empty() {
                    return Err("Meal type name cannot be empty".into());
                }
                let current = ctx.record_or_default().await?;
                if current.find_meal_type(name.trim()).is_some() {
                    return Err(format!("Meal type already exists: {}", name.trim()).into());
                }

                let meal_type = ctx
                    .edit(|record| {
                        let order = order.unwrap_or_else(|| record.next_display_order());
                        let meal_type = MealType::new(name.trim(), icon.trim(), *color)
                            .with_order(order);
                        record.meal_types.push(meal_type.clone());
                        meal_type
                    })
                    .await?;

                println!("Added meal type: {} ({})", meal_type, meal_type.id);
                Ok(())
            }

            DietSubcommand::RemoveType { identifier } => {
                let current = ctx.record_or_default().await?;
                if current.find_meal_type(identifier).is_none() {
                    return Err(format!("Meal type not found: {}", identifier).into());
                }

                // Resolved again inside the edit: a first edit creates the record.
                let removed = ctx
                    .edit(|record| {
                        let id = record.find_meal_type(identifier)?.id;
                        let kept = record.items_for(id).count();
                        record.remove_meal_type(id).map(|meal_type| (meal_type, kept))
                    })
                    .await?;

                let (meal_type, kept) =
                    removed.ok_or_else(|| format!("Meal type not found: {}", identifier))?;
                println!("Removed meal type: {}", meal_type);
                if kept > 0 {
                    println!("{} item(s) kept without a meal type", kept);
                }
                Ok(())
            }

            DietSubcommand::AddItem {
                meal_type,
                food,
                quantity,
                unit,
            } => {
                if food.trim().is_empty() {
                    return Err("Food cannot be empty".into());
                }
                if !quantity.is_finite() || *quantity <= 0.0 {
                    return Err("Quantity must be a positive number".into());
                }

                let current = ctx.record_or_default().await?;
                if current.find_meal_type(meal_type).is_none() {
                    return Err(format!("Meal type not found: {}", meal_type).into());
                }

                let added = ctx
                    .edit(|record| {
                        let target = record.find_meal_type(meal_type)?.clone();
                        let item = MealItem::new(target.id, food.trim(), *quantity, unit.trim());
                        record.meal_items.push(item.clone());
                        Some((target, item))
                    })
                    .await?;

                let (target, item) =
                    added.ok_or_else(|| format!("Meal type not found: {}", meal_type))?;
                println!("Added to {}: {} ({})", target, item, item.id);
                Ok(())
            }

            DietSubcommand::RemoveItem { id } => {
                let current = ctx.record_or_default().await?;
                let item = current
                    .meal_items
                    .iter()
                    .find(|item| item.id == *id)
                    .ok_or_else(|| format!("Item not found: {}", id))?;

                ctx.edit(|record| record.remove_item(*id)).await?;

                println!("Removed item: {}", item);
                Ok(())
            }
        }
    }
}
