//! Global constant parameters: named item values parsed from literal text
//! once, at resolve time, and owned by the blueprint afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::BlueprintError;
use crate::core::logger::ConsoleLogger;
use crate::core::registry::Registries;
use crate::schema::item::{deserialize_item_from_literal, Item, ItemFactory, OwnedItem, VariantDict};
use crate::schema::textual::TextualGlobalConstantParamsBlueprint;

#[derive(Debug)]
pub struct ConstantParam {
    value: OwnedItem,
    add_to_debug_render_world: bool,
}

impl ConstantParam {
    pub fn factory(&self) -> &Arc<dyn ItemFactory> {
        self.value.factory()
    }

    pub fn item(&self) -> &Item {
        self.value.item()
    }

    pub fn add_to_debug_render_world(&self) -> bool {
        self.add_to_debug_render_world
    }

    pub fn to_literal(&self) -> Option<String> {
        self.value.to_literal()
    }
}

/// Resolved constant parameters, keyed by name. Every value is destroyed
/// through its own factory when the blueprint is dropped.
#[derive(Debug, Default)]
pub struct GlobalConstantParamsBlueprint {
    params: BTreeMap<String, ConstantParam>,
}

impl GlobalConstantParamsBlueprint {
    pub fn resolve(
        source: &TextualGlobalConstantParamsBlueprint,
        registries: &Registries,
    ) -> Result<Self, BlueprintError> {
        let mut params = BTreeMap::new();

        for param in &source.params {
            let collector = param
                .error_collector
                .as_ref()
                .or(source.error_collector.as_ref());

            if params.contains_key(&param.name) {
                return Err(BlueprintError::DuplicateParam(param.name.clone()).report(collector));
            }

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

            if !factory.can_be_persistently_serialized() {
                return Err(BlueprintError::NotSerializable {
                    param: param.name.clone(),
                    type_name: factory.name().to_string(),
                }
                .report(collector));
            }

            let deserialization_error = |message: String| {
                BlueprintError::Deserialization {
                    param: param.name.clone(),
                    value: param.value.clone(),
                    message,
                }
                .report(collector)
            };

            let mut value = OwnedItem::create(factory.clone()).ok_or_else(|| {
                deserialization_error(format!("item factory '{}' created no item", factory.name()))
            })?;
            // On failure `value` drops here and goes back to its factory.
            deserialize_item_from_literal(value.item_mut(), factory.as_ref(), &param.value)
                .map_err(deserialization_error)?;

            params.insert(
                param.name.clone(),
                ConstantParam {
                    value,
                    add_to_debug_render_world: param.add_to_debug_render_world,
                },
            );
        }

        tracing::debug!(count = params.len(), "resolved constant params");
        Ok(Self { params })
    }

    /// Expose every constant through `dict`, borrowing the stored items.
    pub fn add_self_to_dict_and_replace<'a>(&'a self, dict: &mut VariantDict<'a>) {
        for (name, param) in &self.params {
            dict.add_or_replace(name, param.factory().clone(), param.item());
        }
    }

    pub fn find(&self, name: &str) -> Option<&ConstantParam> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstantParam)> {
        self.params.iter().map(|(name, param)| (name.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn print_to_console(&self, logger: &mut ConsoleLogger) {
        logger.printf("Constant params:");
        logger.push_indent();
        for (name, param) in &self.params {
            logger.printf(format!(
                "{} = {} [{}]{}",
                name,
                param.to_literal().unwrap_or_default(),
                param.factory().name(),
                if param.add_to_debug_render_world { " (debug)" } else { "" }
            ));
        }
        logger.pop_indent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::item::TypedItemFactory;
    use crate::schema::syntax_error::ErrorLog;
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
            .register_item_factory(Arc::new(TypedItemFactory::<Vec<u8>>::new(
                "blob",
                Uuid::from_u128(2),
            )))
            .unwrap();
        registries
    }

    #[test]
    fn resolves_literal_values() {
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("MaxDistance", TextualTypeRef::by_name("float"), "10.0");
        source.add("MinDistance", TextualTypeRef::by_name("float"), "2.5");

        let resolved = GlobalConstantParamsBlueprint::resolve(&source, &registries()).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved.find("MaxDistance").unwrap().item().downcast_ref::<f32>(),
            Some(&10.0)
        );

        let mut dict = VariantDict::new();
        resolved.add_self_to_dict_and_replace(&mut dict);
        assert_eq!(dict.get::<f32>("MinDistance"), Some(&2.5));
    }

    #[test]
    fn duplicate_names_fail_even_with_same_type() {
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("A", TextualTypeRef::by_name("float"), "1");
        source.add("A", TextualTypeRef::by_name("float"), "1");
        assert!(matches!(
            GlobalConstantParamsBlueprint::resolve(&source, &registries()),
            Err(BlueprintError::DuplicateParam(name)) if name == "A"
        ));
    }

    #[test]
    fn non_serializable_type_is_rejected() {
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("Data", TextualTypeRef::by_name("blob"), "");
        assert!(matches!(
            GlobalConstantParamsBlueprint::resolve(&source, &registries()),
            Err(BlueprintError::NotSerializable { .. })
        ));
    }

    #[test]
    fn parse_error_is_reported_to_collector() {
        let log = ErrorLog::new();
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("MaxDistance", TextualTypeRef::by_name("float"), "far");
        source.params[0].error_collector = Some(log.collector("MaxDistance"));

        let err = GlobalConstantParamsBlueprint::resolve(&source, &registries()).unwrap_err();
        assert!(matches!(err, BlueprintError::Deserialization { .. }));
        assert_eq!(log.len(), 1);
        assert!(log.errors()[0].message.contains("far"));
    }

    #[test]
    fn unknown_type_without_collector_still_fails() {
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("X", TextualTypeRef::by_name("vector"), "0");
        let err = GlobalConstantParamsBlueprint::resolve(&source, &registries()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown ItemFactory: GUID=, name='vector'");
    }

    #[test]
    fn print_lists_values() {
        let mut source = TextualGlobalConstantParamsBlueprint::default();
        source.add("MaxDistance", TextualTypeRef::by_name("float"), "10");
        let resolved = GlobalConstantParamsBlueprint::resolve(&source, &registries()).unwrap();
        let mut logger = ConsoleLogger::new();
        resolved.print_to_console(&mut logger);
        assert_eq!(logger.lines(), ["Constant params:", "  MaxDistance = 10 [float]"]);
    }
}
