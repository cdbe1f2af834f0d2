//! Data model shared by every component
//!
//! Regions are the unit of monitoring; transitions and custom events are
//! the things the engine delivers to the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Geographic point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Which transitions a region reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionFilter {
    #[serde(default = "default_notify")]
    pub notify_on_entry: bool,
    #[serde(default = "default_notify")]
    pub notify_on_exit: bool,
}

impl TransitionFilter {
    /// Whether a transition of `kind` should reach the delegate
    pub fn allows(&self, kind: TransitionKind) -> bool {
        match kind {
            TransitionKind::Enter => self.notify_on_entry,
            TransitionKind::Exit => self.notify_on_exit,
        }
    }
}

impl Default for TransitionFilter {
    fn default() -> Self {
        Self {
            notify_on_entry: true,
            notify_on_exit: true,
        }
    }
}

fn default_notify() -> bool {
    true
}

/// A circular geofence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Unique identifier within a monitoring session
    pub id: String,

    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: String,

    /// Center of the circle
    pub center: Coordinate,

    /// Radius in meters
    pub radius: f64,

    /// Opaque host data echoed back with every event for this region
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Transition subscriptions
    #[serde(default)]
    pub transitions: TransitionFilter,

    /// Lifetime after registration, in milliseconds; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_after_ms: Option<u64>,
}

impl Region {
    /// Create a region that reports both entry and exit
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, radius: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            center: Coordinate::new(latitude, longitude),
            radius,
            metadata: HashMap::new(),
            transitions: TransitionFilter::default(),
            expires_after_ms: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Choose which transitions are reported
    pub fn with_transitions(mut self, notify_on_entry: bool, notify_on_exit: bool) -> Self {
        self.transitions = TransitionFilter {
            notify_on_entry,
            notify_on_exit,
        };
        self
    }

    /// Stop reporting this region once `lifetime` has passed since registration
    pub fn with_expiry(mut self, lifetime: Duration) -> Self {
        self.expires_after_ms = Some(lifetime.as_millis() as u64);
        self
    }

    pub fn expires_after(&self) -> Option<Duration> {
        self.expires_after_ms.map(Duration::from_millis)
    }

    /// Name shown to the host, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Validate the region
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_region("region id cannot be empty"));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::invalid_region(format!(
                "region '{}' radius must be > 0, got {}",
                self.id, self.radius
            )));
        }
        if self.expires_after_ms == Some(0) {
            return Err(Error::invalid_region(format!(
                "region '{}' expiry must be > 0",
                self.id
            )));
        }
        if !self.center.latitude.is_finite() || !(-90.0..=90.0).contains(&self.center.latitude) {
            return Err(Error::invalid_region(format!(
                "region '{}' latitude out of range: {}",
                self.id, self.center.latitude
            )));
        }
        if !self.center.longitude.is_finite()
            || !(-180.0..=180.0).contains(&self.center.longitude)
        {
            return Err(Error::invalid_region(format!(
                "region '{}' longitude out of range: {}",
                self.id, self.center.longitude
            )));
        }
        Ok(())
    }
}

/// Direction of a geofence crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransitionKind {
    Enter,
    Exit,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Enter => "ENTER",
            TransitionKind::Exit => "EXIT",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ENTER" => Ok(TransitionKind::Enter),
            "EXIT" => Ok(TransitionKind::Exit),
            _ => Err(Error::config(format!("unknown transition kind '{}'", s))),
        }
    }
}

/// Where a transition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Reported by the platform monitor
    Platform,
    /// Produced by the host or a simulator
    Synthetic,
}

/// A transition accepted by the debouncer
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub region_id: String,
    pub kind: TransitionKind,
    /// Monotonic clock reading used for debouncing
    pub observed_at: Instant,
    /// Wall clock time reported to the host
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
}

/// Structured payload handed to [`GeofenceDelegate::geofence_event`](crate::traits::GeofenceDelegate::geofence_event)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEventModel {
    pub region_id: String,
    pub kind: TransitionKind,
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
}

impl GeofenceEventModel {
    /// Build the delegate payload for an accepted transition
    pub fn from_transition(event: &TransitionEvent, region: &Region) -> Self {
        Self {
            region_id: event.region_id.clone(),
            kind: event.kind,
            name: region.display_name().to_string(),
            metadata: region.metadata.clone(),
            timestamp: event.timestamp,
            source: event.source,
        }
    }

    /// String-keyed mapping for hosts that want untyped data
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Application-level notification routed through the delegate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl CustomEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// A named event without payload
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, serde_json::Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_validation_rejects_bad_geometry() {
        assert!(Region::new("home", 1.0, 1.0, 100.0).validate().is_ok());
        assert!(Region::new("home", 1.0, 1.0, 0.0).validate().is_err());
        assert!(Region::new("home", 1.0, 1.0, -5.0).validate().is_err());
        assert!(Region::new("home", 1.0, 1.0, f64::NAN).validate().is_err());
        assert!(Region::new("home", 91.0, 1.0, 10.0).validate().is_err());
        assert!(Region::new("home", 1.0, -181.0, 10.0).validate().is_err());
        assert!(Region::new("  ", 1.0, 1.0, 10.0).validate().is_err());
    }

    #[test]
    fn region_deserializes_with_defaults() {
        let region: Region = serde_json::from_str(
            r#"{"id":"office","center":{"latitude":52.5,"longitude":13.4},"radius":250}"#,
        )
        .unwrap();

        assert_eq!(region.display_name(), "office");
        assert!(region.transitions.allows(TransitionKind::Enter));
        assert!(region.transitions.allows(TransitionKind::Exit));
        assert!(region.metadata.is_empty());
    }

    #[test]
    fn expiry_round_trips_and_zero_is_invalid() {
        let region = Region::new("pop-up", 1.0, 1.0, 50.0).with_expiry(Duration::from_secs(90));
        assert_eq!(region.expires_after(), Some(Duration::from_secs(90)));

        let json = serde_json::to_value(&region).unwrap();
        assert_eq!(json["expires_after_ms"], 90_000);
        let plain = serde_json::to_value(Region::new("home", 1.0, 1.0, 50.0)).unwrap();
        assert!(plain.get("expires_after_ms").is_none());

        let zero = Region {
            expires_after_ms: Some(0),
            ..region
        };
        assert!(matches!(zero.validate(), Err(Error::InvalidRegion(_))));
    }

    #[test]
    fn transition_kind_parses_case_insensitively() {
        assert_eq!("enter".parse::<TransitionKind>().unwrap(), TransitionKind::Enter);
        assert_eq!("EXIT".parse::<TransitionKind>().unwrap(), TransitionKind::Exit);
        assert!("dwell".parse::<TransitionKind>().is_err());
    }

    #[test]
    fn event_model_map_uses_host_keys() {
        let region = Region::new("home", 1.0, 1.0, 100.0).with_metadata("floor", "2");
        let event = TransitionEvent {
            region_id: "home".to_string(),
            kind: TransitionKind::Enter,
            observed_at: Instant::now(),
            timestamp: Utc::now(),
            source: EventSource::Platform,
        };

        let map = GeofenceEventModel::from_transition(&event, &region).to_map();
        assert_eq!(map["regionId"], "home");
        assert_eq!(map["kind"], "ENTER");
        assert_eq!(map["metadata"]["floor"], "2");
        assert_eq!(map["source"], "platform");
    }
}
