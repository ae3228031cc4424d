use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Program detail as returned by `GET /api/programs/{id}`.
/// Only the fields fieldcache reads are modelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub id: Option<i64>,
    /// Title keyed by language code, in server order.
    #[serde(rename = "titlePortal", default)]
    pub title_portal: Option<Map<String, Value>>,
}

impl Program {
    /// First non-empty portal title, whatever its language.
    pub fn title(&self) -> Option<String> {
        self.title_portal
            .as_ref()?
            .values()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|title| !title.is_empty())
            .map(str::to_string)
    }
}

/// Entry in the program picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub id: i64,
    pub title: String,
}

impl ProgramSummary {
    pub fn from_program(id: i64, program: &Program) -> Self {
        Self {
            id,
            title: program.title().unwrap_or_else(|| Self::fallback_title(id)),
        }
    }

    pub fn fallback_title(id: i64) -> String {
        format!("Program {}", id)
    }
}
