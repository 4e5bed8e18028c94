//! Response envelope shapes. storage.md §8 asks for three dialects sharing
//! the same underlying data and error names but differing in how a single
//! entry gets wrapped for the wire.

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// The bare entry, no wrapping at all.
    Plain,
    /// The entry wrapped with its own last-modified timestamp.
    Simple,
    /// `Simple`, plus `_links` for self/collection navigation.
    Hypermedia,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleEnvelope {
    pub data: Value,
    pub last_modified: crate::clock::Us,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypermediaEnvelope {
    pub data: Value,
    pub last_modified: crate::clock::Us,
    #[serde(rename = "_links")]
    pub links: Links,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_: String,
    pub collection: String,
}

impl Dialect {
    /// Wraps a single serialized entry per this dialect's envelope shape.
    pub fn wrap_entry(
        &self,
        data: Value,
        last_modified: crate::clock::Us,
        self_link: &str,
        collection_link: &str,
    ) -> Value {
        match self {
            Dialect::Plain => data,
            Dialect::Simple => {
                serde_json::to_value(SimpleEnvelope { data, last_modified }).unwrap_or(Value::Null)
            }
            Dialect::Hypermedia => serde_json::to_value(HypermediaEnvelope {
                data,
                last_modified,
                links: Links { self_: self_link.to_string(), collection: collection_link.to_string() },
            })
            .unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_dialect_does_not_wrap() {
        let data = json!({"id": 1});
        assert_eq!(Dialect::Plain.wrap_entry(data.clone(), 100, "/users/1", "/users"), data);
    }

    #[test]
    fn simple_dialect_wraps_with_last_modified() {
        let wrapped = Dialect::Simple.wrap_entry(json!({"id": 1}), 100, "/users/1", "/users");
        assert_eq!(wrapped["last_modified"], 100);
        assert_eq!(wrapped["data"]["id"], 1);
    }

    #[test]
    fn hypermedia_dialect_adds_links() {
        let wrapped = Dialect::Hypermedia.wrap_entry(json!({"id": 1}), 100, "/users/1", "/users");
        assert_eq!(wrapped["_links"]["self"], "/users/1");
        assert_eq!(wrapped["_links"]["collection"], "/users");
    }
}
