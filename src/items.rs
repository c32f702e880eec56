use std::collections::HashMap;

// Codes are the label encoding the model was trained with.
const ITEMS: [(&str, i64); 20] = [
    ("apples", 0),
    ("bananas", 1),
    ("beef", 2),
    ("chicken", 3),
    ("cooking oil", 4),
    ("eggs", 5),
    ("ghee", 6),
    ("lentils", 7),
    ("milk", 8),
    ("mutton", 9),
    ("onions", 10),
    ("petrol", 11),
    ("potatoes", 12),
    ("rice", 13),
    ("shampoo", 14),
    ("soap", 15),
    ("sugar", 16),
    ("tea", 17),
    ("tomatoes", 18),
    ("wheat flour", 19),
];

/// Lowercase item name -> integer code fed to the model.
pub struct ItemCodeTable {
    codes: HashMap<&'static str, i64>,
}

impl ItemCodeTable {
    pub fn new() -> Self {
        Self {
            codes: ITEMS.iter().copied().collect(),
        }
    }

    /// Case-insensitive lookup. `None` means the item is not supported.
    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.codes.get(name.to_lowercase().as_str()).copied()
    }

    /// Entries in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> {
        ITEMS.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for ItemCodeTable {
    fn default() -> Self {
        Self::new()
    }
}
