//! Attribute reconciliation: turning a sample's label set into the identity
//! of the entity it describes.

pub mod label_mapping;

pub use label_mapping::{AttributeRule, LabelMapping};

use crate::dif::EntityType;
use crate::error::ReconcileError;
use crate::sample::Labels;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity reconciled from one sample's labels
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityAttribute {
    pub id: String,
    pub namespace: String,
    pub ip: String,
    pub service: String,
}

impl EntityAttribute {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Strategy mapping labels onto an entity identity.
///
/// Implementations must be pure: the same labels always produce the same
/// result.
pub trait AttributeReconciler: Send + Sync {
    fn reconcile(
        &self,
        entity_type: EntityType,
        labels: &Labels,
    ) -> Result<EntityAttribute, ReconcileError>;

    fn name(&self) -> &str;
}

type ReconcilerFactory = Arc<dyn Fn(LabelMapping) -> Arc<dyn AttributeReconciler> + Send + Sync>;

/// Chooses the reconciliation strategy for each entity type when
/// definitions are loaded.
///
/// Entity types without a registered factory use their configured
/// [`LabelMapping`] directly.
#[derive(Clone, Default)]
pub struct ReconcilerRegistry {
    factories: HashMap<EntityType, ReconcilerFactory>,
}

impl ReconcilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory that receives the configured label mapping and
    /// returns the strategy to use for `entity_type`.
    pub fn register<F>(&mut self, entity_type: EntityType, factory: F) -> &mut Self
    where
        F: Fn(LabelMapping) -> Arc<dyn AttributeReconciler> + Send + Sync + 'static,
    {
        self.factories.insert(entity_type, Arc::new(factory));
        self
    }

    pub fn resolve(
        &self,
        entity_type: EntityType,
        mapping: LabelMapping,
    ) -> Arc<dyn AttributeReconciler> {
        match self.factories.get(&entity_type) {
            Some(factory) => factory(mapping),
            None => Arc::new(mapping),
        }
    }
}
