use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{RequestError, Result};

/// Replaces spaces with dashes and lowercases, so owners map to predictable S3 keys.
pub fn normalize_owner(owner: &str) -> String {
    owner.replace(' ', "-").to_lowercase()
}

/// Key of a stored widget in the destination bucket: `widgets/{owner}/{widget_id}`.
pub fn s3_key_for_widget(owner: &str, widget_id: &str) -> String {
    format!("widgets/{}/{}", normalize_owner(owner), widget_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
    Unknown(String),
}

impl RequestType {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "create" => RequestType::Create,
            "update" => RequestType::Update,
            "delete" => RequestType::Delete,
            other => RequestType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestType::Create => "create",
            RequestType::Update => "update",
            RequestType::Delete => "delete",
            RequestType::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OtherAttribute {
    pub name: String,
    pub value: String,
}

/// A widget request as produced upstream into the source bucket.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRequest {
    #[serde(rename = "type", default)]
    pub request_type: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub widget_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub other_attributes: Option<Vec<OtherAttribute>>,
}

impl WidgetRequest {
    /// Decodes a raw payload. `key` only labels the error.
    pub fn from_slice(key: &str, payload: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| RequestError::InvalidJson {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let request = serde_json::from_value(value).map_err(|e| RequestError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(request)
    }

    pub fn kind(&self) -> RequestType {
        RequestType::parse(self.request_type.as_deref().unwrap_or_default())
    }

    /// Flattens a create request into top-level string attributes.
    /// `widgetId` and `owner` must be non-empty. Empty labels and descriptions are dropped.
    pub fn to_widget(&self) -> Result<Widget> {
        let widget_id = self
            .widget_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RequestError::MissingField {
                field: "widgetId".to_string(),
            })?;
        let owner = self
            .owner
            .as_deref()
            .filter(|owner| !owner.is_empty())
            .ok_or_else(|| RequestError::MissingField {
                field: "owner".to_string(),
            })?;

        let mut widget = Widget::default();
        widget.insert(Widget::WIDGET_ID, widget_id);
        widget.insert(Widget::OWNER, owner);
        if let Some(label) = self.label.as_deref().filter(|l| !l.is_empty()) {
            widget.insert("label", label);
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            widget.insert("description", description);
        }
        for attribute in self.other_attributes.iter().flatten() {
            widget.insert(&attribute.name, &attribute.value);
        }
        Ok(widget)
    }
}

/// Flat, ordered attribute set of a created widget.
///
/// Serializes as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Widget {
    attributes: Vec<(String, String)>,
}

impl Widget {
    pub const WIDGET_ID: &'static str = "widget_id";
    pub const OWNER: &'static str = "owner";

    /// Sets an attribute. An existing name keeps its position and takes the new value.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn widget_id(&self) -> Option<&str> {
        self.get(Self::WIDGET_ID)
    }

    pub fn owner(&self) -> Option<&str> {
        self.get(Self::OWNER)
    }

    pub fn s3_key(&self) -> Result<String> {
        let owner = self.owner().ok_or_else(|| RequestError::MissingField {
            field: Self::OWNER.to_string(),
        })?;
        let widget_id = self.widget_id().ok_or_else(|| RequestError::MissingField {
            field: Self::WIDGET_ID.to_string(),
        })?;
        Ok(s3_key_for_widget(owner, widget_id))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Serialize for Widget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len()))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
