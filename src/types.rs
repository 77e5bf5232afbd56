use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record kept in one of the JSON collections.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name used in response messages, e.g. "Property not found".
    const LABEL: &'static str;
    /// Route the collection is mounted under.
    const ROUTE: &'static str;

    fn from_form(id: u64, fields: &mut HashMap<String, String>, image: String) -> Self;
    fn id(&self) -> u64;
    fn image(&self) -> &str;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Property {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqft: Option<String>,
    #[serde(default)]
    pub image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Project {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub image: String,
}

impl Record for Property {
    const LABEL: &'static str = "Property";
    const ROUTE: &'static str = "/properties";

    fn from_form(id: u64, fields: &mut HashMap<String, String>, image: String) -> Self {
        Property {
            id,
            name: fields.remove("name"),
            price: fields.remove("price"),
            location: fields.remove("location"),
            sqft: fields.remove("sqft"),
            image,
        }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn image(&self) -> &str {
        &self.image
    }
}

impl Record for Project {
    const LABEL: &'static str = "Project";
    const ROUTE: &'static str = "/projects";

    fn from_form(id: u64, fields: &mut HashMap<String, String>, image: String) -> Self {
        Project {
            id,
            name: fields.remove("name"),
            location: fields.remove("location"),
            description: fields.remove("description"),
            image,
        }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn image(&self) -> &str {
        &self.image
    }
}

/// Flattens a JSON create body into form fields. Strings are kept verbatim,
/// other scalars keep their JSON text and `null` counts as absent.
pub fn fields_from_json(body: Map<String, Value>) -> HashMap<String, String> {
    body.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Message {
            message: message.into(),
        }
    }
}
