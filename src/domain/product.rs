//! Catalog item identifiers and the normalized product record
//!
//! `ProductRecord` is what a successful fetch stores; it is built leniently
//! from whatever object the catalog API returns.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

/// External identifier of one catalog item.
///
/// The value is only ever rendered into the request path, so it is kept
/// opaque beyond being numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// Normalized product payload built from one catalog API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Identifier echoed back by the server (may be missing)
    pub id: Option<u64>,
    pub name: Option<String>,
    pub url_key: Option<String>,
    /// Price kept as the server's JSON number so integer prices stay integers
    pub price: Option<Number>,
    /// Description after markup removal and length capping
    pub description: String,
    /// Image base URLs in server order; entries without a base URL are dropped
    pub images: Vec<String>,
}

impl ProductRecord {
    /// Build a record from the API object.
    ///
    /// Missing or oddly typed fields never fail the conversion, they just come
    /// out empty. Returns `None` only when the payload is not a JSON object.
    pub fn from_api_value<F>(value: &Value, normalize_description: F) -> Option<Self>
    where
        F: FnOnce(Option<&str>) -> String,
    {
        let object = value.as_object()?;

        let id = object.get("id").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let price = object.get("price").and_then(|v| match v {
            Value::Number(n) => Some(n.clone()),
            Value::String(s) => s.trim().parse::<Number>().ok(),
            _ => None,
        });

        let images = object
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|img| img.get("base_url").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            name: string_field(value, "name"),
            url_key: string_field(value, "url_key"),
            price,
            description: normalize_description(object.get("description").and_then(Value::as_str)),
            images,
        })
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}
