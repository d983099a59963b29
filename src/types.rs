//! # Core Data Model
//!
//! FeatureKey, FeatureDefinition, FeatureValue, and computation job states.
//! All caching and request deduplication operate at [`FeatureKey`]
//! granularity: `(entity, feature name, feature version)`. The version is
//! part of the key, so bumping a definition naturally invalidates everything
//! stored under the previous version.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

use crate::schema::Schema;

/// Composite key uniquely identifying one storable feature value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    /// Opaque identifier naming the subject of enrichment.
    pub entity: String,
    /// Feature name, unique within the store.
    pub feature: String,
    /// Version of the definition that produces this value.
    pub version: u32,
}

impl FeatureKey {
    pub fn new(entity: impl Into<String>, feature: impl Into<String>, version: u32) -> Self {
        Self {
            entity: entity.into(),
            feature: feature.into(),
            version,
        }
    }

    /// Canonical storage key, `{entity}/{feature}/v{version}`.
    pub fn key_string(&self) -> String {
        format!("{}/{}/v{}", self.entity, self.feature, self.version)
    }

    /// Storage key prefix selecting every feature of one entity.
    pub fn entity_prefix(entity: &str) -> String {
        format!("{entity}/")
    }

    /// Parse a canonical storage key back into its components. Entities may
    /// themselves contain `/`, so the feature and version are taken from the
    /// right.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.rsplitn(3, '/');
        let version = parts.next()?.strip_prefix('v')?.parse().ok()?;
        let feature = parts.next()?.to_string();
        let entity = parts.next()?.to_string();
        if entity.is_empty() || feature.is_empty() {
            return None;
        }
        Some(Self {
            entity,
            feature,
            version,
        })
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/v{}", self.entity, self.feature, self.version)
    }
}

/// An immutable, versioned description of how one feature is computed.
///
/// Re-registering a feature with different computation logic requires a
/// strictly greater version; the registry enforces monotonicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDefinition {
    /// Feature name, unique within the store.
    pub name: String,
    /// Monotonically increasing version per feature name.
    pub version: u32,
    /// Name of the worker capability that computes this feature.
    pub capability: String,
    /// Prompt template handed to the enrichment worker.
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Model identifier the worker should invoke.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Free-form model parameters (temperature, max tokens, ...).
    #[serde(default)]
    pub parameters: JsonValue,
    /// Optional schema the raw input must satisfy.
    #[serde(default)]
    pub input_schema: Option<Schema>,
    /// Optional schema computed payloads are validated against.
    #[serde(default)]
    pub output_schema: Option<Schema>,
    /// Per-feature TTL override in seconds; wins over the store default.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>, version: u32, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            capability: capability.into(),
            prompt_template: None,
            model_id: None,
            parameters: JsonValue::Null,
            input_schema: None,
            output_schema: None,
            ttl_seconds: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    /// Key addressing this definition's value for one entity.
    pub fn key_for(&self, entity: &str) -> FeatureKey {
        FeatureKey::new(entity, self.name.clone(), self.version)
    }
}

/// A computed enrichment result plus the metadata the engine checks on reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    /// Opaque computed payload.
    pub payload: JsonValue,
    /// When the worker produced this value.
    pub computed_at: DateTime<Utc>,
    /// Version of the definition that produced it. Checked on reads as a
    /// second guard against values written out-of-band under the wrong key.
    pub feature_version: u32,
    /// Optional expiry; an expired value is treated as a miss.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FeatureValue {
    pub fn new(payload: JsonValue, feature_version: u32) -> Self {
        Self {
            payload,
            computed_at: Utc::now(),
            feature_version,
            expires_at: None,
        }
    }

    /// Set an expiry `ttl` after the computation time. A TTL too large to
    /// represent as a timestamp saturates to "no expiry".
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.computed_at.checked_add_signed(ttl));
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }
}

/// Lifecycle of one in-flight computation job.
///
/// `Pending -> Running -> {Succeeded | Pending (retry) | Failed}`, plus
/// `Cancelled` for a pending job whose waiters all detached before it was
/// admitted. A job never re-enters `Running` without being re-admitted by
/// the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Cancelled = 4,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl From<u8> for JobState {
    fn from(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Succeeded,
            3 => JobState::Failed,
            _ => JobState::Cancelled,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal result broadcast to every waiter of a computation job.
pub type JobOutcome = crate::error::Result<FeatureValue>;
