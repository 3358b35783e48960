//! Mapping Registry - All entity descriptors for one runtime, assembled once
//! at startup and validated eagerly

use std::collections::HashMap;

use crate::error::{OrmError, OrmResult};
use crate::mapping::{AssociationDescriptor, EntityDescriptor};
use crate::model::{erased_loader, Entity, ErasedLoader};

/// One registered entity type: its descriptor plus the monomorphized
/// hydration entry point used when the concrete type is not statically known
/// (eager-fetch targets).
pub struct EntityBinding {
    pub descriptor: &'static EntityDescriptor,
    pub(crate) loader: ErasedLoader,
}

/// Pre-validated mapping metadata for one runtime. The unit of work treats
/// this as static input; nothing is discovered at runtime.
pub struct MappingRegistry {
    entities: HashMap<&'static str, EntityBinding>,
}

impl MappingRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            bindings: Vec::new(),
        }
    }

    pub fn descriptor(&self, entity: &str) -> OrmResult<&'static EntityDescriptor> {
        self.binding(entity).map(|b| b.descriptor)
    }

    pub(crate) fn binding(&self, entity: &str) -> OrmResult<&EntityBinding> {
        self.entities
            .get(entity)
            .ok_or_else(|| OrmError::Mapping(format!("entity '{entity}' is not registered")))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static EntityDescriptor> + '_ {
        self.entities.values().map(|b| b.descriptor)
    }

    /// The target key shape an association's foreign key must decode against.
    pub(crate) fn association_target(
        &self,
        association: &AssociationDescriptor,
    ) -> OrmResult<&'static EntityDescriptor> {
        self.descriptor(association.target)
    }
}

/// Builder collecting entity registrations before the eager validation pass.
pub struct RegistryBuilder {
    bindings: Vec<EntityBinding>,
}

impl RegistryBuilder {
    pub fn entity<T: Entity>(mut self) -> Self {
        self.bindings.push(EntityBinding {
            descriptor: T::descriptor(),
            loader: erased_loader::<T>,
        });
        self
    }

    /// Validate every descriptor and all cross-entity references; fail fast
    /// on the first inconsistency.
    pub fn build(self) -> OrmResult<MappingRegistry> {
        let mut entities: HashMap<&'static str, EntityBinding> = HashMap::new();
        let mut tables: HashMap<&'static str, &'static str> = HashMap::new();

        for binding in self.bindings {
            let descriptor = binding.descriptor;
            descriptor.validate()?;
            if entities.insert(descriptor.entity, binding).is_some() {
                return Err(OrmError::Mapping(format!(
                    "entity '{}' registered twice",
                    descriptor.entity
                )));
            }
            if let Some(other) = tables.insert(descriptor.table, descriptor.entity) {
                return Err(OrmError::Mapping(format!(
                    "table '{}' mapped by both '{}' and '{}'",
                    descriptor.table, other, descriptor.entity
                )));
            }
        }

        for binding in entities.values() {
            for association in &binding.descriptor.associations {
                let target = entities.get(association.target).ok_or_else(|| {
                    OrmError::Mapping(format!(
                        "entity '{}': association '{}' targets unregistered entity '{}'",
                        binding.descriptor.entity, association.name, association.target
                    ))
                })?;
                if association.foreign_key.len() != target.descriptor.key.columns.len() {
                    return Err(OrmError::Mapping(format!(
                        "entity '{}': association '{}' has {} foreign-key columns, \
                         target key has {}",
                        binding.descriptor.entity,
                        association.name,
                        association.foreign_key.len(),
                        target.descriptor.key.columns.len()
                    )));
                }
            }
        }

        Ok(MappingRegistry { entities })
    }
}
