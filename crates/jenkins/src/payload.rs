use buildwatch_core::models::BuildResult;
use serde_json::Value;

/// Fields of `lastBuild/api/json` the status tracking cares about.
///
/// Every field is optional: a field of the wrong type is treated as missing so a single
/// unexpected value never invalidates the rest of the reply.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LastBuild {
    pub result: Option<String>,
    pub building: Option<bool>,
    pub number: Option<i64>,
    pub culprits: Vec<String>,
    pub description: Option<String>,
    pub full_display_name: Option<String>,
    pub display_name: Option<String>,
}

impl LastBuild {
    /// Extracts the build fields from a decoded reply. Anything other than an object yields
    /// an empty build.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let string = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            result: string("result"),
            building: object.get("building").and_then(Value::as_bool),
            number: object.get("number").and_then(Value::as_i64),
            culprits: object
                .get("culprits")
                .and_then(Value::as_array)
                .map(|culprits| culprits.iter().filter_map(culprit_name).collect())
                .unwrap_or_default(),
            description: string("description"),
            full_display_name: string("fullDisplayName"),
            display_name: string("displayName"),
        }
    }

    pub fn status(&self) -> BuildResult { BuildResult::from_jenkins(self.result.as_deref()) }

    pub fn culprits_text(&self) -> Option<String> {
        (!self.culprits.is_empty()).then(|| format!("Culprits: {}", self.culprits.join(", ")))
    }

    /// The full display name without the trailing short display name, which Jenkins repeats
    /// (`"MyJob #42"` with display name `"#42"` becomes `"MyJob"`).
    pub fn name(&self) -> String {
        let full = self.full_display_name.as_deref().unwrap_or_default();
        if let Some(display) = self.display_name.as_deref()
            && let Some(name) = full.strip_suffix(display).and_then(|s| s.strip_suffix(' '))
        {
            return name.to_string();
        }
        full.to_string()
    }
}

// Jenkins reports culprits as user objects; plain names are accepted too.
fn culprit_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(user) => user.get("fullName").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}
