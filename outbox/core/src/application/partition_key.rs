// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Partition Key Extractor
//!
//! Derives the broker partition key from a serialized outbox payload so that
//! events of one aggregate (or, failing that, one tenant) land on the same
//! partition and stay ordered relative to each other.
//!
//! Lookup order is every identifier field, then every tenant field, as
//! configured in [`PartitionKeyFields`]. Each field is checked at the top
//! level of the payload and then inside its `data` object. Anything unparseable yields `None`, never an error.

use serde_json::Value;

use crate::domain::relay_config::PartitionKeyFields;

#[derive(Debug, Clone)]
pub struct PartitionKeyExtractor {
    identifier_fields: Vec<String>,
    tenant_fields: Vec<String>,
}

impl Default for PartitionKeyExtractor {
    fn default() -> Self {
        Self::new(&PartitionKeyFields::default())
    }
}

impl PartitionKeyExtractor {
    pub fn new(fields: &PartitionKeyFields) -> Self {
        Self {
            identifier_fields: fields.identifiers.clone(),
            tenant_fields: fields.tenants.clone(),
        }
    }

    pub fn extract(&self, payload: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Payload is not JSON; publishing without key");
                return None;
            }
        };

        self.first_of(&value, &self.identifier_fields)
            .or_else(|| self.first_of(&value, &self.tenant_fields))
    }

    fn first_of(&self, value: &Value, fields: &[String]) -> Option<String> {
        let data = value.get("data");
        fields.iter().find_map(|field| {
            key_from(value.get(field)).or_else(|| key_from(data.and_then(|d| d.get(field))))
        })
    }
}

fn key_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
