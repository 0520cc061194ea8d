//! Global runtime parameters: typed slots the caller fills per query run.
//! Declarations are type-checked against the parent query chain.

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{BlueprintError, InstantiateError};
use crate::core::logger::ConsoleLogger;
use crate::core::query::QueryBlueprint;
use crate::core::registry::Registries;
use crate::schema::item::{same_item_factory, ItemFactory, VariantDict};
use crate::schema::textual::TextualGlobalRuntimeParamsBlueprint;

#[derive(Clone)]
pub struct RuntimeParam {
    factory: Arc<dyn ItemFactory>,
    add_to_debug_render_world: bool,
}

impl RuntimeParam {
    pub fn factory(&self) -> &Arc<dyn ItemFactory> {
        &self.factory
    }

    pub fn add_to_debug_render_world(&self) -> bool {
        self.add_to_debug_render_world
    }
}

impl std::fmt::Debug for RuntimeParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeParam")
            .field("factory", &self.factory.name())
            .field("add_to_debug_render_world", &self.add_to_debug_render_world)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlobalRuntimeParamsBlueprint {
    params: BTreeMap<String, RuntimeParam>,
}

impl GlobalRuntimeParamsBlueprint {
    /// Resolve `source`. When `parent` is given, a name already declared
    /// anywhere up the chain must keep the same item type.
    pub fn resolve(
        source: &TextualGlobalRuntimeParamsBlueprint,
        registries: &Registries,
        parent: Option<&QueryBlueprint>,
    ) -> Result<Self, BlueprintError> {
        // In-source duplicates first, so an inherited name is never
        // mistaken for one.
        let mut seen = FxHashSet::default();
        for param in &source.params {
            if !seen.insert(param.name.as_str()) {
                let collector = param
                    .error_collector
                    .as_ref()
                    .or(source.error_collector.as_ref());
                return Err(BlueprintError::DuplicateParam(param.name.clone()).report(collector));
            }
        }

        let mut params = BTreeMap::new();
        for param in &source.params {
            let collector = param
                .error_collector
                .as_ref()
                .or(source.error_collector.as_ref());

            let factory = registries
                .items
                .find(&param.item_type.guid, &param.item_type.name)
                .cloned()
                .ok_or_else(|| {
                    BlueprintError::UnknownFactory {
                        kind: "ItemFactory",
                        guid: param.item_type.guid.clone(),
                        name: param.item_type.name.clone(),
                    }
                    .report(collector)
                })?;

            if let Some(inherited) =
                Self::find_item_factory_by_param_name_in_parent_recursively(&param.name, parent)
            {
                if !same_item_factory(inherited, &factory) {
                    return Err(BlueprintError::TypeMismatch {
                        param: param.name.clone(),
                        parent_type: inherited.name().to_string(),
                        child_type: factory.name().to_string(),
                    }
                    .report(collector));
                }
            }

            params.insert(
                param.name.clone(),
                RuntimeParam {
                    factory,
                    add_to_debug_render_world: param.add_to_debug_render_world,
                },
            );
        }

        tracing::debug!(count = params.len(), "resolved runtime params");
        Ok(Self { params })
    }

    /// Walk `parent` and its ancestors for a runtime parameter called `name`.
    pub fn find_item_factory_by_param_name_in_parent_recursively<'a>(
        name: &str,
        parent: Option<&'a QueryBlueprint>,
    ) -> Option<&'a Arc<dyn ItemFactory>> {
        let mut current = parent;
        while let Some(query) = current {
            if let Some(param) = query.runtime_params().find(name) {
                return Some(param.factory());
            }
            current = query.parent();
        }
        None
    }

    /// Check that every declared parameter is present in `supplied` with
    /// the declared type.
    pub fn check_supplied(&self, supplied: &VariantDict<'_>) -> Result<(), InstantiateError> {
        for (name, param) in &self.params {
            let entry = supplied
                .find(name)
                .ok_or_else(|| InstantiateError::MissingRuntimeParam(name.clone()))?;
            let expected = param.factory.item_type();
            if entry.item.value_type_id() != expected.id() {
                return Err(InstantiateError::RuntimeParamTypeMismatch {
                    name: name.clone(),
                    expected: expected.to_string(),
                    actual: entry.factory.item_type().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&RuntimeParam> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuntimeParam)> {
        self.params.iter().map(|(name, param)| (name.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn print_to_console(&self, logger: &mut ConsoleLogger) {
        logger.printf("Runtime params:");
        logger.push_indent();
        for (name, param) in &self.params {
            logger.printf(format!(
                "{} [{}]{}",
                name,
                param.factory.name(),
                if param.add_to_debug_render_world { " (debug)" } else { "" }
            ));
        }
        logger.pop_indent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::item::{Item, TypedItemFactory};
    use crate::schema::textual::TextualTypeRef;
    use uuid::Uuid;

    fn registries() -> Registries {
        let mut registries = Registries::new();
        registries
            .register_item_factory(Arc::new(TypedItemFactory::<f32>::with_literal(
                "float",
                Uuid::from_u128(1),
            )))
            .unwrap();
        registries
            .register_item_factory(Arc::new(TypedItemFactory::<i32>::with_literal(
                "int",
                Uuid::from_u128(2),
            )))
            .unwrap();
        registries
    }

    #[test]
    fn duplicates_rejected_before_lookup() {
        let mut source = TextualGlobalRuntimeParamsBlueprint::default();
        source.add("Team", TextualTypeRef::by_name("int"));
        source.add("Team", TextualTypeRef::by_name("nonexistent"));
        assert!(matches!(
            GlobalRuntimeParamsBlueprint::resolve(&source, &registries(), None),
            Err(BlueprintError::DuplicateParam(_))
        ));
    }

    #[test]
    fn resolves_by_guid() {
        let mut source = TextualGlobalRuntimeParamsBlueprint::default();
        source.add(
            "Team",
            TextualTypeRef {
                name: "wrong".to_string(),
                guid: Uuid::from_u128(2).to_string(),
            },
        );
        let resolved = GlobalRuntimeParamsBlueprint::resolve(&source, &registries(), None).unwrap();
        assert_eq!(resolved.find("Team").unwrap().factory().name(), "int");
    }

    #[test]
    fn check_supplied_values() {
        let registries = registries();
        let mut source = TextualGlobalRuntimeParamsBlueprint::default();
        source.add("Team", TextualTypeRef::by_name("int"));
        let resolved = GlobalRuntimeParamsBlueprint::resolve(&source, &registries, None).unwrap();

        let empty = VariantDict::new();
        assert!(matches!(
            resolved.check_supplied(&empty),
            Err(InstantiateError::MissingRuntimeParam(name)) if name == "Team"
        ));

        let wrong = Item::new(1.0_f32);
        let team = Item::new(3_i32);
        let mut dict = VariantDict::new();
        dict.add_or_replace("Team", registries.items.find_by_name("float").unwrap().clone(), &wrong);
        assert!(matches!(
            resolved.check_supplied(&dict),
            Err(InstantiateError::RuntimeParamTypeMismatch { .. })
        ));

        dict.add_or_replace("Team", registries.items.find_by_name("int").unwrap().clone(), &team);
        assert!(resolved.check_supplied(&dict).is_ok());
    }
}
