//! Decoding of `docker events --format '{{json .}}'` lines.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Actor {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

/// One event from the runtime stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeEvent {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Action", default)]
    pub action: String,
    #[serde(rename = "Actor", default)]
    pub actor: Actor,
}

impl RuntimeEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn is_container_start(&self) -> bool {
        self.kind == "container" && self.action == "start"
    }

    /// Container name from the actor attributes, without a leading `/`.
    pub fn container_name(&self) -> Option<&str> {
        self.actor
            .attributes
            .get("name")
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
    }
}
