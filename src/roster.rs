use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Character {
    pub id: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

const fn character(
    id: &'static str,
    name: &'static str,
    emoji: &'static str,
    color: &'static str,
    description: &'static str,
) -> Character {
    Character {
        id,
        name,
        emoji,
        color,
        description,
    }
}

pub static ROSTER: [Character; 20] = [
    character("marine", "Space Marine", "🪖", "#4CAF50", "Tough as nails marine"),
    character("scout", "Scout", "🏃", "#2196F3", "Fast and agile"),
    character("heavy", "Heavy Gunner", "💪", "#FF5722", "Strong and powerful"),
    character("sniper", "Sniper", "🎯", "#9C27B0", "Precise and deadly"),
    character("medic", "Combat Medic", "⚕️", "#4CAF50", "Heals and fights"),
    character("engineer", "Engineer", "🔧", "#FF9800", "Builds and repairs"),
    character("assassin", "Assassin", "🥷", "#424242", "Silent but deadly"),
    character("berserker", "Berserker", "😤", "#F44336", "Rage-fueled warrior"),
    character("cyborg", "Cyborg", "🤖", "#607D8B", "Half machine, all deadly"),
    character(
        "demon_hunter",
        "Demon Hunter",
        "😈",
        "#9C27B0",
        "Specialized in demon slaying",
    ),
    character("cartman", "Eric Cartman", "🍔", "#FF6B35", "Respects his authoritah!"),
    character(
        "kenny",
        "Kenny McCormick",
        "💀",
        "#FFA500",
        "Oh my God, they killed Kenny!",
    ),
    character(
        "stan",
        "Stan Marsh",
        "🤮",
        "#4169E1",
        "This is pretty f***ed up right here",
    ),
    character("kyle", "Kyle Broflovski", "🧠", "#228B22", "You bastards!"),
    character("butters", "Butters Stotch", "🌻", "#FFD700", "Oh hamburgers!"),
    character("randy", "Randy Marsh", "🍺", "#8B4513", "I thought this was America!"),
    character("chef", "Chef", "🎵", "#8B0000", "Hello there children!"),
    character("towelie", "Towelie", "🌿", "#90EE90", "Don't forget to bring a towel!"),
    character(
        "underpants_gnomes",
        "Underpants Gnomes",
        "👙",
        "#9370DB",
        "Phase 1: Collect underpants",
    ),
    character("mr_hankey", "Mr. Hankey", "💩", "#8B4513", "Howdy ho!"),
];

pub fn character_by_id(id: &str) -> Option<&'static Character> {
    ROSTER.iter().find(|character| character.id == id)
}

#[derive(Deserialize)]
struct CharacterRef {
    id: String,
}

/// Resolves a character sent over the wire back to its roster entry.
pub fn deserialize_character<'de, D>(deserializer: D) -> Result<&'static Character, D::Error>
where
    D: Deserializer<'de>,
{
    let reference = CharacterRef::deserialize(deserializer)?;
    character_by_id(&reference.id).ok_or_else(|| {
        serde::de::Error::custom(format!("unknown character id {}", reference.id))
    })
}
