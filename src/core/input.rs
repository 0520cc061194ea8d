//! Input parameters: the declared inputs of generators and functions, the
//! parameter block filled at run time, and the resolved input tree that
//! describes how each input is computed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::error::BlueprintError;
use crate::core::function::{
    Function, FunctionCtorContext, FunctionFactory, FunctionFault, LeafFunctionKind,
};
use crate::core::logger::ConsoleLogger;
use crate::core::query::QueryBlueprint;
use crate::core::registry::Registries;
use crate::schema::item::{Item, ItemFactory, ItemList, ItemTypeInfo};
use crate::schema::syntax_error::SyntaxErrorCollector;
use crate::schema::textual::TextualInputBlueprint;

/// One declared input.
#[derive(Debug, Clone)]
pub struct InputParameter {
    name: String,
    item_type: ItemTypeInfo,
    element_type: Option<ItemTypeInfo>,
    description: String,
    offset: usize,
}

impl InputParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_type(&self) -> ItemTypeInfo {
        self.item_type
    }

    /// Element type of an `ItemList` input declared with
    /// [`InputParameterRegistry::with_list_of`].
    pub fn element_type(&self) -> Option<ItemTypeInfo> {
        self.element_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Slot in the parameter block.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Ordered list of the inputs a generator or function declares.
#[derive(Debug, Clone, Default)]
pub struct InputParameterRegistry {
    params: Vec<InputParameter>,
}

impl InputParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input of type `T`.
    pub fn with<T: Any>(mut self, name: &str, description: &str) -> Self {
        self.push(name, ItemTypeInfo::of::<T>(), None, description);
        self
    }

    /// Declare an `ItemList` input whose items are of type `T`.
    pub fn with_list_of<T: Any>(mut self, name: &str, description: &str) -> Self {
        self.push(
            name,
            ItemTypeInfo::of::<ItemList>(),
            Some(ItemTypeInfo::of::<T>()),
            description,
        );
        self
    }

    fn push(
        &mut self,
        name: &str,
        item_type: ItemTypeInfo,
        element_type: Option<ItemTypeInfo>,
        description: &str,
    ) {
        let offset = self.params.len();
        self.params.push(InputParameter {
            name: name.to_string(),
            item_type,
            element_type,
            description: description.to_string(),
            offset,
        });
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    pub fn parameter(&self, offset: usize) -> Option<&InputParameter> {
        self.params.get(offset)
    }

    pub fn find(&self, name: &str) -> Option<&InputParameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputParameter> {
        self.params.iter()
    }
}

/// Holder for the input values of one generator instantiation.
pub struct ParamsBlock {
    registry: Arc<InputParameterRegistry>,
    slots: Vec<Option<Item>>,
}

impl ParamsBlock {
    pub fn new(registry: Arc<InputParameterRegistry>) -> Self {
        let slots = (0..registry.parameter_count()).map(|_| None).collect();
        Self { registry, slots }
    }

    pub fn registry(&self) -> &InputParameterRegistry {
        &self.registry
    }

    /// Store `item` at `offset`; the value must match the declared type.
    pub fn set(&mut self, offset: usize, item: Item) -> Result<(), FunctionFault> {
        let param = self
            .registry
            .parameter(offset)
            .ok_or_else(|| FunctionFault::new(format!("no input parameter at offset {}", offset)))?;
        if item.value_type_id() != param.item_type.id() {
            return Err(FunctionFault::new(format!(
                "value for input '{}' is not of type {}",
                param.name, param.item_type
            )));
        }
        self.slots[offset] = Some(item);
        Ok(())
    }

    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        let param = self.registry.find(name)?;
        self.slots[param.offset].as_ref()?.downcast_ref::<T>()
    }

    pub fn get_at(&self, offset: usize) -> Option<&Item> {
        self.slots.get(offset)?.as_ref()
    }

    /// Move a value out of the block.
    pub fn take<T: Any>(&mut self, name: &str) -> Option<T> {
        let offset = self.registry.find(name)?.offset;
        let item = self.slots[offset].take()?;
        match item.downcast::<T>() {
            Ok(value) => Some(value),
            Err(item) => {
                self.slots[offset] = Some(item);
                None
            }
        }
    }

    /// True once every declared input holds a value.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

impl fmt::Debug for ParamsBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled: Vec<(&str, bool)> = self
            .registry
            .iter()
            .map(|p| (p.name(), self.slots[p.offset].is_some()))
            .collect();
        f.debug_struct("ParamsBlock").field("filled", &filled).finish()
    }
}

/// What an input tree is resolved against.
pub struct InputResolveContext<'a> {
    pub registries: &'a Registries,
    /// The query that owns the input tree; global parameters and the
    /// shuttled item type are looked up here.
    pub query: &'a QueryBlueprint,
    /// Whether `IteratedItem` functions are allowed. Generators run before
    /// any items exist, so they resolve with `false`.
    pub allow_iterated_item: bool,
    /// Name used in diagnostics for the root's owner.
    pub owner: &'a str,
}

/// A resolved input node. The root has no function; every other node binds
/// one declared parameter to a function call.
pub struct InputBlueprint {
    param_name: String,
    param_offset: usize,
    function_factory: Option<Arc<dyn FunctionFactory>>,
    function: Option<Arc<dyn Function>>,
    return_value: String,
    debug_item_factory: Option<Arc<dyn ItemFactory>>,
    children: Vec<InputBlueprint>,
}

impl InputBlueprint {
    /// Resolve `root` against the declared inputs in `registry`.
    pub fn resolve(
        root: &TextualInputBlueprint,
        registry: &InputParameterRegistry,
        ctx: &InputResolveContext<'_>,
    ) -> Result<InputBlueprint, BlueprintError> {
        let children = Self::resolve_children(root, registry, ctx.owner, ctx)?;
        Ok(InputBlueprint {
            param_name: String::new(),
            param_offset: 0,
            function_factory: None,
            function: None,
            return_value: String::new(),
            debug_item_factory: None,
            children,
        })
    }

    fn resolve_children(
        source: &TextualInputBlueprint,
        registry: &InputParameterRegistry,
        owner: &str,
        ctx: &InputResolveContext<'_>,
    ) -> Result<Vec<InputBlueprint>, BlueprintError> {
        for child in &source.children {
            if registry.find(&child.param_name).is_none() {
                return Err(BlueprintError::UnknownInput {
                    param: child.param_name.clone(),
                    owner: owner.to_string(),
                }
                .report(collector_of(child, source)));
            }
        }

        // Children come out in declaration order so that a node's argument
        // list lines up with its function's registry.
        let mut resolved = Vec::with_capacity(registry.parameter_count());
        for param in registry.iter() {
            let mut matching = source
                .children
                .iter()
                .filter(|child| child.param_name == param.name());
            let child = matching.next().ok_or_else(|| {
                BlueprintError::MissingInput {
                    param: param.name().to_string(),
                    owner: owner.to_string(),
                }
                .report(source.error_collector.as_ref())
            })?;
            if let Some(duplicate) = matching.next() {
                return Err(BlueprintError::DuplicateParam(param.name().to_string())
                    .report(collector_of(duplicate, source)));
            }
            resolved.push(Self::resolve_node(child, param, ctx)?);
        }
        Ok(resolved)
    }

    fn resolve_node(
        source: &TextualInputBlueprint,
        param: &InputParameter,
        ctx: &InputResolveContext<'_>,
    ) -> Result<InputBlueprint, BlueprintError> {
        let collector = source.error_collector.as_ref();

        let factory = ctx
            .registries
            .functions
            .find(&source.func_guid, &source.func_name)
            .cloned()
            .ok_or_else(|| {
                BlueprintError::UnknownFactory {
                    kind: "FunctionFactory",
                    guid: source.func_guid.clone(),
                    name: source.func_name.clone(),
                }
                .report(collector)
            })?;

        if factory.return_type() != param.item_type() {
            return Err(BlueprintError::ReturnTypeMismatch {
                param: param.name().to_string(),
                function: factory.name().to_string(),
                expected: param.item_type().to_string(),
                actual: factory.return_type().to_string(),
            }
            .report(collector));
        }

        match factory.leaf_kind() {
            LeafFunctionKind::None | LeafFunctionKind::Literal => {}
            LeafFunctionKind::GlobalParam => {
                let global = &source.func_return_value;
                match ctx.query.find_global_param_type_recursively(global) {
                    None => {
                        return Err(BlueprintError::UnknownGlobalParam {
                            param: param.name().to_string(),
                            global: global.clone(),
                        }
                        .report(collector));
                    }
                    Some(actual) if actual != factory.return_type() => {
                        return Err(BlueprintError::GlobalParamTypeMismatch {
                            param: param.name().to_string(),
                            global: global.clone(),
                            expected: factory.return_type().to_string(),
                            actual: actual.to_string(),
                        }
                        .report(collector));
                    }
                    Some(_) => {}
                }
            }
            LeafFunctionKind::IteratedItem => {
                if !ctx.allow_iterated_item {
                    return Err(BlueprintError::IteratedItemUnavailable {
                        param: param.name().to_string(),
                        function: factory.name().to_string(),
                    }
                    .report(collector));
                }
            }
            LeafFunctionKind::ShuttledItems => {
                let expected = factory.leaf_item_type().unwrap_or(factory.return_type());
                match ctx.query.shuttled_item_type() {
                    None => {
                        return Err(BlueprintError::ShuttledItemsUnsupported {
                            user: format!("function '{}'", factory.name()),
                            expected: expected.to_string(),
                        }
                        .report(collector));
                    }
                    Some(provided) if provided != expected => {
                        return Err(BlueprintError::ShuttleTypeMismatch {
                            expected: expected.to_string(),
                            provided: provided.to_string(),
                        }
                        .report(collector));
                    }
                    Some(_) => {}
                }
                if let Some(element_type) = param.element_type() {
                    if element_type != expected {
                        return Err(BlueprintError::ListElementTypeMismatch {
                            param: param.name().to_string(),
                            function: factory.name().to_string(),
                            expected: element_type.to_string(),
                            actual: expected.to_string(),
                        }
                        .report(collector));
                    }
                }
            }
        }

        let function = factory
            .create_function(&FunctionCtorContext {
                param_or_return_value: &source.func_return_value,
            })
            .map_err(|message| {
                BlueprintError::FunctionCreation {
                    param: param.name().to_string(),
                    function: factory.name().to_string(),
                    message,
                }
                .report(collector)
            })?;

        let owner = format!("function '{}'", factory.name());
        let children =
            Self::resolve_children(source, factory.input_parameter_registry(), &owner, ctx)?;

        let debug_item_factory = if source.add_return_value_to_debug_render_world {
            ctx.registries
                .item_factory_for_type(factory.return_type().id())
                .cloned()
        } else {
            None
        };

        Ok(InputBlueprint {
            param_name: param.name().to_string(),
            param_offset: param.offset(),
            function_factory: Some(factory),
            function: Some(Arc::from(function)),
            return_value: source.func_return_value.clone(),
            debug_item_factory,
            children,
        })
    }

    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn param_offset(&self) -> usize {
        self.param_offset
    }

    pub fn function_factory(&self) -> Option<&Arc<dyn FunctionFactory>> {
        self.function_factory.as_ref()
    }

    pub fn function(&self) -> Option<&Arc<dyn Function>> {
        self.function.as_ref()
    }

    /// Literal text or global parameter name the function was created with.
    pub fn return_value(&self) -> &str {
        &self.return_value
    }

    /// Set when the return value should be shown in debug output.
    pub fn debug_item_factory(&self) -> Option<&Arc<dyn ItemFactory>> {
        self.debug_item_factory.as_ref()
    }

    pub fn children(&self) -> &[InputBlueprint] {
        &self.children
    }

    pub fn print_to_console(&self, logger: &mut ConsoleLogger) {
        if let Some(factory) = &self.function_factory {
            if self.return_value.is_empty() {
                logger.printf(format!("{} = {}", self.param_name, factory.name()));
            } else {
                logger.printf(format!(
                    "{} = {} ('{}')",
                    self.param_name,
                    factory.name(),
                    self.return_value
                ));
            }
        }
        logger.push_indent();
        for child in &self.children {
            child.print_to_console(logger);
        }
        logger.pop_indent();
    }
}

impl fmt::Debug for InputBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBlueprint")
            .field("param_name", &self.param_name)
            .field(
                "function",
                &self.function_factory.as_ref().map(|f| f.name().to_string()),
            )
            .field("children", &self.children)
            .finish()
    }
}

fn collector_of<'a>(
    child: &'a TextualInputBlueprint,
    parent: &'a TextualInputBlueprint,
) -> Option<&'a SyntaxErrorCollector> {
    child
        .error_collector
        .as_ref()
        .or(parent.error_collector.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<InputParameterRegistry> {
        Arc::new(
            InputParameterRegistry::new()
                .with::<f32>("MaxDistance", "search radius")
                .with::<i32>("MaxItems", "upper bound"),
        )
    }

    #[test]
    fn registry_assigns_offsets_in_declaration_order() {
        let registry = registry();
        assert_eq!(registry.parameter_count(), 2);
        assert_eq!(registry.find("MaxDistance").unwrap().offset(), 0);
        assert_eq!(registry.find("MaxItems").unwrap().offset(), 1);
        assert_eq!(
            registry.parameter(1).unwrap().item_type(),
            ItemTypeInfo::of::<i32>()
        );
        assert!(registry.find("Other").is_none());
    }

    #[test]
    fn params_block_type_checks_writes() {
        let mut block = ParamsBlock::new(registry());
        assert!(!block.is_complete());
        assert!(block.set(0, Item::new(5_i32)).is_err());
        block.set(0, Item::new(5.0_f32)).unwrap();
        block.set(1, Item::new(3_i32)).unwrap();
        assert!(block.set(2, Item::new(3_i32)).is_err());
        assert!(block.is_complete());
        assert_eq!(block.get::<f32>("MaxDistance"), Some(&5.0));
        assert_eq!(block.get::<f32>("MaxItems"), None);
        assert_eq!(block.take::<i32>("MaxItems"), Some(3));
        assert!(!block.is_complete());
    }
}
