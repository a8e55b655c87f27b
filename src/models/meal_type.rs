use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A user-defined meal slot (breakfast, lunch, ...) in a diet plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealType {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Color,
    pub display_order: i32,
}

impl MealType {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, color: Color) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            icon: icon.into(),
            color,
            display_order: 0,
        }
    }

    pub fn with_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }

    /// The meal types every new diet starts with.
    pub fn defaults() -> Vec<MealType> {
        [
            ("Café da manhã", "☕", Color::rgb(0xF5, 0xA6, 0x23)),
            ("Almoço", "🍽", Color::rgb(0x4C, 0xAF, 0x50)),
            ("Jantar", "🌙", Color::rgb(0x3F, 0x51, 0xB5)),
            ("Lanche", "🍎", Color::rgb(0xE9, 0x1E, 0x63)),
        ]
        .into_iter()
        .zip(0..)
        .map(|((name, icon, color), order)| MealType::new(name, icon, color).with_order(order))
        .collect()
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon, self.name)
    }
}

/// `#RRGGBB` color, stored and exchanged as its hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(u8, u8, u8);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(r, g, b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid color '{}'. Use the #RRGGBB format", s);

        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Color(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_display() {
        assert_eq!(Color::rgb(0xF5, 0xA6, 0x23).to_string(), "#F5A623");
        assert_eq!(Color::rgb(0, 0, 0).to_string(), "#000000");
    }

    #[test]
    fn test_color_from_str() {
        assert_eq!(Color::from_str("#4caf50").unwrap(), Color::rgb(0x4C, 0xAF, 0x50));
        assert_eq!(Color::from_str("#FFFFFF").unwrap(), Color::rgb(255, 255, 255));
    }

    #[test]
    fn test_color_from_str_invalid() {
        assert!(Color::from_str("4CAF50").is_err());
        assert!(Color::from_str("#4CAF5").is_err());
        assert!(Color::from_str("#GGGGGG").is_err());
        assert!(Color::from_str("").is_err());
    }

    #[test]
    fn test_meal_type_json_uses_camel_case_and_hex_color() {
        let meal_type = MealType::new("Almoço", "🍽", Color::rgb(0x4C, 0xAF, 0x50)).with_order(1);
        let json = serde_json::to_value(&meal_type).unwrap();

        assert_eq!(json["displayOrder"], 1);
        assert_eq!(json["color"], "#4CAF50");

        let parsed: MealType = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, meal_type);
    }

    #[test]
    fn test_defaults_are_ordered() {
        let defaults = MealType::defaults();
        assert_eq!(defaults.len(), 4);
        assert_eq!(defaults[0].name, "Café da manhã");
        let orders: Vec<i32> = defaults.iter().map(|m| m.display_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }
}
