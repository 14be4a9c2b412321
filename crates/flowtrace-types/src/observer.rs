//! Observer model types.
//!
//! An observer tracks one dataset/ETL process. Its coordinates
//! (namespace, name, dataset props, zone tag) form an alternate key used
//! for lookups; the primary identity is an opaque [`ObserverId`].

use serde::{Deserialize, Serialize};

use crate::ids::ObserverId;

/// Default namespace for observers declared without one.
pub const DEFAULT_NAMESPACE: &str = "ROOT";
/// Default dataset-props value for observers declared without one.
pub const DEFAULT_DATASET_PROPS: &str = "NA";
/// Default zone tag for observers declared without one.
pub const DEFAULT_ZONE_TAG: i64 = 1;

/// Lifecycle status of an observer.
///
/// Disabled observers cannot start runs; retired observers cannot be used
/// as endpoints of new associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverStatus {
    Disabled,
    Enabled,
    Retired,
}

impl ObserverStatus {
    /// Numeric code persisted to the store.
    #[must_use]
    pub fn as_code(self) -> i64 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
            Self::Retired => 2,
        }
    }

    /// Decode a stored status code. Returns `None` for unknown codes.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Disabled),
            1 => Some(Self::Enabled),
            2 => Some(Self::Retired),
            _ => None,
        }
    }

    /// Parse the wire-format status string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Self::Disabled),
            "enabled" => Some(Self::Enabled),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObserverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Retired => "retired",
        };
        f.write_str(s)
    }
}

/// Alternate-key coordinates of an observer.
///
/// The tuple (namespace, name, dataset props, zone tag) is intended to be
/// unique per observer, though declare does not currently enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverKey {
    /// Model name, usually a human-readable dataset name.
    pub model_name: String,
    /// Optional grouping namespace.
    pub model_namespace: String,
    /// Partition keys or other name=value props describing the dataset.
    pub model_dataset_props: String,
    /// Data-lake zone tag, non-negative.
    pub model_zone_tag: i64,
}

impl ObserverKey {
    /// Coordinates for `model_name` with default namespace, props, and zone.
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_namespace: DEFAULT_NAMESPACE.into(),
            model_dataset_props: DEFAULT_DATASET_PROPS.into(),
            model_zone_tag: DEFAULT_ZONE_TAG,
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.model_namespace = namespace.into();
        self
    }

    /// Set the dataset props.
    #[must_use]
    pub fn with_dataset_props(mut self, props: impl Into<String>) -> Self {
        self.model_dataset_props = props.into();
        self
    }

    /// Set the zone tag.
    #[must_use]
    pub fn with_zone_tag(mut self, zone_tag: i64) -> Self {
        self.model_zone_tag = zone_tag;
        self
    }
}

/// Declaration request for a new observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverSpec {
    /// Alternate-key coordinates.
    pub key: ObserverKey,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque config blob snapshotted into each run at start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer_config: Option<String>,
}

impl ObserverSpec {
    /// Declaration with the given coordinates and no optional fields.
    #[must_use]
    pub fn new(key: ObserverKey) -> Self {
        Self {
            key,
            display_name: None,
            description: None,
            observer_config: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the observer config blob.
    #[must_use]
    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.observer_config = Some(config.into());
        self
    }
}

/// A stored observer record.
///
/// Timestamps are RFC-3339 UTC strings as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    pub observer_id: ObserverId,
    pub key: ObserverKey,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub observer_config: Option<String>,
    pub status: ObserverStatus,
    pub created_at: String,
    pub status_updated_at: String,
}

/// Partial update of an observer's mutable fields.
///
/// Only fields that are `Some` are written; an update with no fields set
/// is rejected by the registry. Compiled to parameterized SQL, never
/// string-concatenated values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer_config: Option<String>,
}

impl ObserverUpdate {
    /// Update with no fields set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the observer config blob.
    #[must_use]
    pub fn observer_config(mut self, config: impl Into<String>) -> Self {
        self.observer_config = Some(config.into());
        self
    }

    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.description.is_none() && self.observer_config.is_none()
    }
}

/// Reference to a sink observer, by id or by alternate-key coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkRef {
    /// Direct observer id.
    ById(ObserverId),
    /// Coordinate-tuple lookup.
    ByKey(ObserverKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_roundtrip() {
        for status in [
            ObserverStatus::Disabled,
            ObserverStatus::Enabled,
            ObserverStatus::Retired,
        ] {
            assert_eq!(ObserverStatus::from_code(status.as_code()), Some(status));
        }
        assert_eq!(ObserverStatus::from_code(3), None);
        assert_eq!(ObserverStatus::from_code(-1), None);
    }

    #[test]
    fn status_parse_matches_display() {
        for status in [
            ObserverStatus::Disabled,
            ObserverStatus::Enabled,
            ObserverStatus::Retired,
        ] {
            assert_eq!(ObserverStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(ObserverStatus::parse("archived"), None);
        assert_eq!(ObserverStatus::parse(""), None);
        assert_eq!(ObserverStatus::parse("Enabled"), None);
    }

    #[test]
    fn key_defaults() {
        let key = ObserverKey::new("billing");
        assert_eq!(key.model_namespace, "ROOT");
        assert_eq!(key.model_dataset_props, "NA");
        assert_eq!(key.model_zone_tag, 1);
    }

    #[test]
    fn key_builders() {
        let key = ObserverKey::new("billing")
            .with_namespace("finance")
            .with_dataset_props("region=emea")
            .with_zone_tag(3);
        assert_eq!(key.model_namespace, "finance");
        assert_eq!(key.model_dataset_props, "region=emea");
        assert_eq!(key.model_zone_tag, 3);
    }

    #[test]
    fn update_is_empty() {
        assert!(ObserverUpdate::new().is_empty());
        assert!(!ObserverUpdate::new().description("x").is_empty());
    }

    #[test]
    fn spec_serde_skips_absent_fields() {
        let spec = ObserverSpec::new(ObserverKey::new("m"));
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("display_name").is_none());
        assert!(json.get("description").is_none());
    }
}
