//! Facet Payloads
//!
//! Typed values for the facets the crate ships with, decoded from the
//! transport's human-readable JSON. Numbers may arrive as JSON numbers or as
//! digit-grouped strings (`"1,000"`); text fields may arrive plain or wrapped
//! as `{"Raw": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::Address;
use crate::error::{MetaError, MetaResult};

pub type PoolId = u32;

/// Turns one raw per-address payload into a typed value
pub type Decoder = fn(&Value) -> MetaResult<FacetValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMembership {
    pub pool_id: PoolId,
    pub points: u128,
    pub last_recorded_reward_counter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display: Option<String>,
    pub legal: Option<String>,
    pub email: Option<String>,
    pub web: Option<String>,
    pub twitter: Option<String>,
    /// Registrar verdicts, e.g. `Reasonable`, `KnownGood`
    pub judgements: Vec<String>,
}

impl Identity {
    pub fn with_display(display: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
            ..Self::default()
        }
    }
}

/// A sub-account record pointing at its parent ("super") account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubIdentityOf {
    pub parent: Address,
    pub sub_name: Option<String>,
    /// Parent's identity, filled by the dependent lookup
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FacetValue {
    Member(PoolMembership),
    Identity(Identity),
    SubIdentity(SubIdentityOf),
}

impl FacetValue {
    /// Key of the second-stage lookup this value needs, if any
    pub fn dependent_key(&self) -> Option<&Address> {
        match self {
            FacetValue::SubIdentity(sub) => Some(&sub.parent),
            _ => None,
        }
    }

    /// Inject a second-stage result. Returns `false` if the pair does not fit.
    pub fn attach_nested(&mut self, nested: FacetValue) -> bool {
        match (self, nested) {
            (FacetValue::SubIdentity(sub), FacetValue::Identity(identity)) => {
                sub.identity = Some(identity);
                true
            }
            _ => false,
        }
    }

    pub fn has_nested(&self) -> bool {
        matches!(self, FacetValue::SubIdentity(SubIdentityOf { identity: Some(_), .. }))
    }

    pub fn decode_member(raw: &Value) -> MetaResult<FacetValue> {
        let pool_id = field(raw, &["poolId", "pool_id"])
            .and_then(parse_number)
            .ok_or_else(|| MetaError::Decode(format!("pool member without poolId: {}", raw)))?;
        let pool_id = PoolId::try_from(pool_id)
            .map_err(|_| MetaError::Decode(format!("poolId {} out of range", pool_id)))?;
        let points = field(raw, &["points"]).and_then(parse_number).unwrap_or(0);
        let last_recorded_reward_counter = field(raw, &["lastRecordedRewardCounter", "last_recorded_reward_counter"])
            .and_then(text);

        Ok(FacetValue::Member(PoolMembership {
            pool_id,
            points,
            last_recorded_reward_counter,
        }))
    }

    pub fn decode_identity(raw: &Value) -> MetaResult<FacetValue> {
        // Newer runtimes wrap the registration as `[registration, username]`
        let registration = match raw {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| MetaError::Decode("empty identity tuple".to_string()))?,
            other => other,
        };
        if !registration.is_object() {
            return Err(MetaError::Decode(format!("identity is not an object: {}", raw)));
        }
        let info = registration.get("info").unwrap_or(registration);

        let judgements = registration
            .get("judgements")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(verdict).collect())
            .unwrap_or_default();

        Ok(FacetValue::Identity(Identity {
            display: info.get("display").and_then(text),
            legal: info.get("legal").and_then(text),
            email: info.get("email").and_then(text),
            web: info.get("web").and_then(text),
            twitter: info.get("twitter").and_then(text),
            judgements,
        }))
    }

    pub fn decode_sub_identity(raw: &Value) -> MetaResult<FacetValue> {
        let (parent, name) = match raw {
            Value::Array(items) => (items.first(), items.get(1)),
            Value::Object(_) => (field(raw, &["parent", "super"]), field(raw, &["subName", "sub_name"])),
            _ => (None, None),
        };
        let parent = parent
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| MetaError::Decode(format!("sub identity without parent: {}", raw)))?;

        Ok(FacetValue::SubIdentity(SubIdentityOf {
            parent: Address::new(parent),
            sub_name: name.and_then(text),
            identity: None,
        }))
    }
}

fn field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| raw.get(*n))
}

fn parse_number(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

/// Plain string, `{"Raw": ..}` wrapper, or nothing for `"None"` / `null`
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s == "None" || s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("Raw").and_then(text),
        _ => None,
    }
}

/// Verdict label from a `[registrar, verdict]` pair
fn verdict(pair: &Value) -> Option<String> {
    match pair.as_array()?.get(1)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.keys().next().cloned(),
        _ => None,
    }
}
