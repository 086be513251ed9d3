use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Item type the fixtures pipe around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub color: String,
}

impl Widget {
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: color.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Two stored widgets, ids 1 and 2
#[must_use]
pub fn two_widgets() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "sprocket", "color": "red"}),
        json!({"id": 2, "name": "gear", "color": "blue"}),
    ]
}
