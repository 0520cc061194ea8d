//! Factory registries: lookup of item factories, function factories and
//! generator factories by GUID or by name.

use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::core::function::{FunctionFactory, LeafFunctionFactory, LeafFunctionKind};
use crate::core::generator::GeneratorFactory;
use crate::schema::item::ItemFactory;

/// Anything that can be registered: carries a stable GUID and a
/// human-readable name.
pub trait Registered {
    fn name(&self) -> &str;
    fn guid(&self) -> Uuid;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} with GUID {guid} is already registered")]
    DuplicateGuid { kind: &'static str, guid: Uuid },
    #[error("{kind} named '{name}' is already registered")]
    DuplicateName { kind: &'static str, name: String },
    #[error("an item factory for type {0} is already registered")]
    DuplicateItemType(&'static str),
}

/// One registry of factories of the same kind.
pub struct FactoryDatabase<F: ?Sized> {
    kind: &'static str,
    factories: Vec<Arc<F>>,
    by_guid: FxHashMap<Uuid, usize>,
    by_name: FxHashMap<String, usize>,
}

impl<F: ?Sized + Registered> FactoryDatabase<F> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: Vec::new(),
            by_guid: FxHashMap::default(),
            by_name: FxHashMap::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn register(&mut self, factory: Arc<F>) -> Result<(), RegistryError> {
        self.check_vacant(&*factory)?;
        let index = self.factories.len();
        self.by_guid.insert(factory.guid(), index);
        self.by_name.insert(factory.name().to_string(), index);
        self.factories.push(factory);
        Ok(())
    }

    /// Fails if `factory`'s GUID or name is already taken.
    pub fn check_vacant(&self, factory: &F) -> Result<(), RegistryError> {
        let guid = factory.guid();
        if self.by_guid.contains_key(&guid) {
            return Err(RegistryError::DuplicateGuid {
                kind: self.kind,
                guid,
            });
        }
        if self.by_name.contains_key(factory.name()) {
            return Err(RegistryError::DuplicateName {
                kind: self.kind,
                name: factory.name().to_string(),
            });
        }
        Ok(())
    }

    pub fn find_by_guid(&self, guid: &Uuid) -> Option<&Arc<F>> {
        self.by_guid.get(guid).map(|&i| &self.factories[i])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<F>> {
        self.by_name.get(name).map(|&i| &self.factories[i])
    }

    /// GUID first, then name. An unparsable GUID counts as a GUID miss.
    pub fn find(&self, guid: &str, name: &str) -> Option<&Arc<F>> {
        Uuid::parse_str(guid.trim())
            .ok()
            .and_then(|guid| self.find_by_guid(&guid))
            .or_else(|| self.find_by_name(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<F>> {
        self.factories.iter()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<F: ?Sized + Registered> fmt::Debug for FactoryDatabase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDatabase")
            .field("kind", &self.kind)
            .field(
                "names",
                &self.factories.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// All registries a blueprint resolves against. Filled during engine
/// start-up, read-only afterwards.
pub struct Registries {
    pub items: FactoryDatabase<dyn ItemFactory>,
    pub functions: FactoryDatabase<dyn FunctionFactory>,
    pub generators: FactoryDatabase<dyn GeneratorFactory>,
    items_by_type: FxHashMap<TypeId, Arc<dyn ItemFactory>>,
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("items", &self.items)
            .field("functions", &self.functions)
            .field("generators", &self.generators)
            .finish()
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Registries {
    pub fn new() -> Self {
        Self {
            items: FactoryDatabase::new("ItemFactory"),
            functions: FactoryDatabase::new("FunctionFactory"),
            generators: FactoryDatabase::new("GeneratorFactory"),
            items_by_type: FxHashMap::default(),
        }
    }

    /// Register an item type together with its leaf functions
    /// (`Literal<..>` for serializable types, `GlobalParam<..>`,
    /// `IteratedItem<..>`, `ShuttledItems<..>`).
    ///
    /// Nothing is registered unless the item and all its leaf functions fit.
    pub fn register_item_factory(
        &mut self,
        factory: Arc<dyn ItemFactory>,
    ) -> Result<(), RegistryError> {
        let item_type = factory.item_type();
        if self.items_by_type.contains_key(&item_type.id()) {
            return Err(RegistryError::DuplicateItemType(item_type.name()));
        }
        self.items.check_vacant(&*factory)?;

        let mut kinds = Vec::with_capacity(4);
        if factory.can_be_persistently_serialized() {
            kinds.push(LeafFunctionKind::Literal);
        }
        kinds.extend([
            LeafFunctionKind::GlobalParam,
            LeafFunctionKind::IteratedItem,
            LeafFunctionKind::ShuttledItems,
        ]);
        let leaves: Vec<Arc<dyn FunctionFactory>> = kinds
            .into_iter()
            .map(|kind| {
                Arc::new(LeafFunctionFactory::new(kind, factory.clone())) as Arc<dyn FunctionFactory>
            })
            .collect();
        for leaf in &leaves {
            self.functions.check_vacant(&**leaf)?;
        }

        self.items.register(factory.clone())?;
        self.items_by_type.insert(item_type.id(), factory.clone());
        for leaf in leaves {
            self.functions.register(leaf)?;
        }

        tracing::debug!(
            item_type = factory.name(),
            guid = %factory.guid(),
            "registered item factory"
        );
        Ok(())
    }

    pub fn register_function_factory(
        &mut self,
        factory: Arc<dyn FunctionFactory>,
    ) -> Result<(), RegistryError> {
        self.functions.register(factory)
    }

    pub fn register_generator_factory(
        &mut self,
        factory: Arc<dyn GeneratorFactory>,
    ) -> Result<(), RegistryError> {
        self.generators.register(factory)
    }

    pub fn item_factory_for_type(&self, type_id: TypeId) -> Option<&Arc<dyn ItemFactory>> {
        self.items_by_type.get(&type_id)
    }
}
