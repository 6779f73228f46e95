//! Label-driven reconciliation configured per entity type.
//!
//! Each attribute (`id`, `ip`, `namespace`, `service`) is read from one label,
//! optionally filtered through a regular expression and rewritten with a
//! replacement template (`$1`, `${name}` ...). Attributes flagged as
//! identifiers are joined to form the entity id; the `ip` attribute stands in
//! when no identifier can be built.

use crate::dif::EntityType;
use crate::error::ReconcileError;
use crate::reconcile::{AttributeReconciler, EntityAttribute};
use crate::sample::Labels;
use crate::EngineError;
use regex::Regex;
use std::collections::BTreeMap;

pub const ATTR_ID: &str = "id";
pub const ATTR_IP: &str = "ip";
pub const ATTR_NAMESPACE: &str = "namespace";
pub const ATTR_SERVICE: &str = "service";

pub const DEFAULT_DELIMITER: &str = ":";
const WHOLE_MATCH: &str = "$0";

#[derive(Debug, Clone)]
pub struct AttributeRule {
    pub label: String,
    pattern: Option<Regex>,
    replacement: String,
    pub is_identifier: bool,
}

impl AttributeRule {
    /// Take the label value verbatim
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: None,
            replacement: WHOLE_MATCH.to_string(),
            is_identifier: false,
        }
    }

    /// Take the part of the label value matching `pattern`, rewritten with
    /// `replacement` (the whole match when `None`).
    pub fn matching(
        attribute: &str,
        label: impl Into<String>,
        pattern: &str,
        replacement: Option<&str>,
    ) -> crate::Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| EngineError::InvalidPattern {
            attribute: attribute.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            label: label.into(),
            pattern: Some(regex),
            replacement: replacement.unwrap_or(WHOLE_MATCH).to_string(),
            is_identifier: false,
        })
    }

    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    /// Extract this attribute from `labels`; `None` when the label is absent,
    /// the pattern does not match, or the result is empty.
    pub fn extract(&self, labels: &Labels) -> Option<String> {
        let raw = labels.get(&self.label)?;
        let value = match &self.pattern {
            None => raw.clone(),
            Some(regex) => {
                let caps = regex.captures(raw)?;
                let mut out = String::new();
                caps.expand(&self.replacement, &mut out);
                out
            }
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelMapping {
    rules: BTreeMap<String, AttributeRule>,
    delimiter: String,
}

impl Default for LabelMapping {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl LabelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, attribute: impl Into<String>, rule: AttributeRule) -> Self {
        self.rules.insert(attribute.into(), rule);
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &AttributeRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    fn attribute(&self, name: &str, labels: &Labels) -> String {
        self.rules
            .get(name)
            .and_then(|rule| rule.extract(labels))
            .unwrap_or_default()
    }

    fn identifier(&self, labels: &Labels) -> Result<Option<String>, ReconcileError> {
        let mut parts = Vec::new();
        for (name, rule) in self.rules.iter().filter(|(_, r)| r.is_identifier) {
            match rule.extract(labels) {
                Some(part) => parts.push(part),
                None if !labels.contains_key(&rule.label) => {
                    return Err(ReconcileError::MissingLabel {
                        attribute: name.clone(),
                        label: rule.label.clone(),
                    })
                }
                None => return Ok(None),
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(parts.join(&self.delimiter)))
    }
}

impl AttributeReconciler for LabelMapping {
    fn reconcile(
        &self,
        entity_type: EntityType,
        labels: &Labels,
    ) -> Result<EntityAttribute, ReconcileError> {
        let ip = self.attribute(ATTR_IP, labels);

        let id = match self.identifier(labels) {
            Ok(Some(id)) => id,
            Ok(None) | Err(_) if !ip.is_empty() => ip.clone(),
            Ok(None) => {
                return Err(ReconcileError::MissingIdentifier {
                    entity_type: entity_type.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        Ok(EntityAttribute {
            id,
            ip,
            namespace: self.attribute(ATTR_NAMESPACE, labels),
            service: self.attribute(ATTR_SERVICE, labels),
        })
    }

    fn name(&self) -> &str {
        "label-mapping"
    }
}
