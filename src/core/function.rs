//! Functions and the function-call hierarchy.
//!
//! Each non-root node of a resolved input tree is a bound function call.
//! [`FunctionCallHierarchy`] flattens the tree children-first and executes it
//! against a blackboard to fill a parameter block.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::blackboard::ExecuteContext;
use crate::core::input::{InputBlueprint, InputParameterRegistry, ParamsBlock};
use crate::core::registry::Registered;
use crate::schema::item::{
    deserialize_item_from_literal, Item, ItemFactory, ItemList, ItemTypeInfo, OwnedItem,
};

/// How a leaf function obtains its value. Non-leaf functions use `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafFunctionKind {
    None,
    /// A constant parsed from literal text at resolve time.
    Literal,
    /// A constant or runtime parameter read from the blackboard.
    GlobalParam,
    /// The item currently being evaluated.
    IteratedItem,
    /// The items handed in from the enclosing query.
    ShuttledItems,
}

impl LeafFunctionKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::None => "Function",
            Self::Literal => "Literal",
            Self::GlobalParam => "GlobalParam",
            Self::IteratedItem => "IteratedItem",
            Self::ShuttledItems => "ShuttledItems",
        }
    }
}

/// A function-level execution fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFault {
    function: Option<String>,
    message: String,
}

impl FunctionFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            function: None,
            message: message.into(),
        }
    }

    /// Tag the fault with the function that raised it.
    pub fn in_function(mut self, function: &str) -> Self {
        self.function = Some(function.to_string());
        self
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FunctionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "function '{}': {}", function, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FunctionFault {}

/// Arguments handed to [`FunctionFactory::create_function`].
#[derive(Debug, Clone, Copy)]
pub struct FunctionCtorContext<'a> {
    /// Literal text for literal functions, the parameter name for
    /// global-param functions.
    pub param_or_return_value: &'a str,
}

/// Computed input values of one function call, in the order of the
/// function's input registry.
pub struct FunctionArgs<'r> {
    registry: &'r InputParameterRegistry,
    values: Vec<Option<Item>>,
}

impl<'r> FunctionArgs<'r> {
    pub fn new(registry: &'r InputParameterRegistry, values: Vec<Item>) -> Self {
        Self {
            registry,
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn get<T: Any>(&self, name: &str) -> Result<&T, FunctionFault> {
        let offset = self.offset_of(name)?;
        self.values
            .get(offset)
            .and_then(Option::as_ref)
            .and_then(|item| item.downcast_ref::<T>())
            .ok_or_else(|| FunctionFault::new(format!("argument '{}' is unavailable", name)))
    }

    /// Move an argument out.
    pub fn take<T: Any>(&mut self, name: &str) -> Result<T, FunctionFault> {
        let offset = self.offset_of(name)?;
        let item = self
            .values
            .get_mut(offset)
            .and_then(Option::take)
            .ok_or_else(|| FunctionFault::new(format!("argument '{}' is unavailable", name)))?;
        item.downcast::<T>()
            .map_err(|_| FunctionFault::new(format!("argument '{}' has an unexpected type", name)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn offset_of(&self, name: &str) -> Result<usize, FunctionFault> {
        self.registry
            .find(name)
            .map(|p| p.offset())
            .ok_or_else(|| FunctionFault::new(format!("no argument named '{}'", name)))
    }
}

/// A bound function. Created once at resolve time, executed once per run.
pub trait Function: Send + Sync {
    fn execute(
        &self,
        ctx: &ExecuteContext<'_>,
        args: &mut FunctionArgs<'_>,
    ) -> Result<Item, FunctionFault>;
}

/// Registered entry point for one kind of function.
pub trait FunctionFactory: Registered + Send + Sync {
    fn return_type(&self) -> ItemTypeInfo;

    fn leaf_kind(&self) -> LeafFunctionKind {
        LeafFunctionKind::None
    }

    /// Element type a leaf function refers to, when it differs from the
    /// return type (shuttled items return a whole list).
    fn leaf_item_type(&self) -> Option<ItemTypeInfo> {
        None
    }

    fn input_parameter_registry(&self) -> &InputParameterRegistry;

    fn create_function(&self, ctx: &FunctionCtorContext<'_>) -> Result<Box<dyn Function>, String>;
}

/// Leaf functions every registered item type gets.
pub struct LeafFunctionFactory {
    kind: LeafFunctionKind,
    name: String,
    guid: Uuid,
    item_factory: Arc<dyn ItemFactory>,
    registry: InputParameterRegistry,
}

impl LeafFunctionFactory {
    pub fn new(kind: LeafFunctionKind, item_factory: Arc<dyn ItemFactory>) -> Self {
        let prefix = kind.prefix();
        Self {
            kind,
            name: format!("{}<{}>", prefix, item_factory.name()),
            guid: Uuid::new_v5(&item_factory.guid(), prefix.as_bytes()),
            item_factory,
            registry: InputParameterRegistry::new(),
        }
    }
}

impl Registered for LeafFunctionFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn guid(&self) -> Uuid {
        self.guid
    }
}

impl FunctionFactory for LeafFunctionFactory {
    fn return_type(&self) -> ItemTypeInfo {
        match self.kind {
            LeafFunctionKind::ShuttledItems => ItemTypeInfo::of::<ItemList>(),
            _ => self.item_factory.item_type(),
        }
    }

    fn leaf_kind(&self) -> LeafFunctionKind {
        self.kind
    }

    fn leaf_item_type(&self) -> Option<ItemTypeInfo> {
        Some(self.item_factory.item_type())
    }

    fn input_parameter_registry(&self) -> &InputParameterRegistry {
        &self.registry
    }

    fn create_function(&self, ctx: &FunctionCtorContext<'_>) -> Result<Box<dyn Function>, String> {
        let item_factory = self.item_factory.clone();
        match self.kind {
            LeafFunctionKind::Literal => {
                let mut value = OwnedItem::create(item_factory.clone())
                    .ok_or_else(|| format!("item factory '{}' created no item", item_factory.name()))?;
                deserialize_item_from_literal(
                    value.item_mut(),
                    item_factory.as_ref(),
                    ctx.param_or_return_value,
                )?;
                Ok(Box::new(LiteralFunction { value }))
            }
            LeafFunctionKind::GlobalParam => {
                if ctx.param_or_return_value.is_empty() {
                    return Err("no global parameter name given".to_string());
                }
                Ok(Box::new(GlobalParamFunction {
                    name: ctx.param_or_return_value.to_string(),
                    item_factory,
                }))
            }
            LeafFunctionKind::IteratedItem => Ok(Box::new(IteratedItemFunction { item_factory })),
            LeafFunctionKind::ShuttledItems => Ok(Box::new(ShuttledItemsFunction { item_factory })),
            LeafFunctionKind::None => Err(format!("'{}' is not a leaf function", self.name)),
        }
    }
}

struct LiteralFunction {
    value: OwnedItem,
}

impl Function for LiteralFunction {
    fn execute(&self, _: &ExecuteContext<'_>, _: &mut FunctionArgs<'_>) -> Result<Item, FunctionFault> {
        self.value
            .factory()
            .clone_item(self.value.item())
            .ok_or_else(|| FunctionFault::new("could not copy literal value"))
    }
}

struct GlobalParamFunction {
    name: String,
    item_factory: Arc<dyn ItemFactory>,
}

impl Function for GlobalParamFunction {
    fn execute(&self, ctx: &ExecuteContext<'_>, _: &mut FunctionArgs<'_>) -> Result<Item, FunctionFault> {
        let entry = ctx.blackboard.global_params.find(&self.name).ok_or_else(|| {
            FunctionFault::new(format!(
                "global parameter '{}' is missing from the blackboard",
                self.name
            ))
        })?;
        self.item_factory.clone_item(entry.item).ok_or_else(|| {
            FunctionFault::new(format!(
                "global parameter '{}' is not of type {}",
                self.name,
                self.item_factory.item_type()
            ))
        })
    }
}

struct IteratedItemFunction {
    item_factory: Arc<dyn ItemFactory>,
}

impl Function for IteratedItemFunction {
    fn execute(&self, ctx: &ExecuteContext<'_>, _: &mut FunctionArgs<'_>) -> Result<Item, FunctionFault> {
        let items = ctx
            .blackboard
            .iterated_items
            .ok_or_else(|| FunctionFault::new("no items are being iterated"))?;
        let item = items.get_item(ctx.current_item_index).ok_or_else(|| {
            FunctionFault::new(format!("item index {} out of range", ctx.current_item_index))
        })?;
        self.item_factory.clone_item(item).ok_or_else(|| {
            FunctionFault::new(format!(
                "iterated item is not of type {}",
                self.item_factory.item_type()
            ))
        })
    }
}

struct ShuttledItemsFunction {
    item_factory: Arc<dyn ItemFactory>,
}

impl Function for ShuttledItemsFunction {
    fn execute(&self, ctx: &ExecuteContext<'_>, _: &mut FunctionArgs<'_>) -> Result<Item, FunctionFault> {
        let items = ctx
            .blackboard
            .shuttled_items
            .ok_or_else(|| FunctionFault::new("no shuttled items on the blackboard"))?;
        if items.item_type() != self.item_factory.item_type() {
            return Err(FunctionFault::new(format!(
                "shuttled items are of type {}, expected {}",
                items.item_type(),
                self.item_factory.item_type()
            )));
        }
        items
            .clone_with(self.item_factory.as_ref())
            .map(Item::new)
            .ok_or_else(|| FunctionFault::new("could not copy shuttled items"))
    }
}

type ExecuteFn =
    dyn Fn(&ExecuteContext<'_>, &mut FunctionArgs<'_>) -> Result<Item, FunctionFault> + Send + Sync;

/// Closure-backed function factory for computed (non-leaf) functions.
pub struct FnFunctionFactory {
    name: String,
    guid: Uuid,
    return_type: ItemTypeInfo,
    registry: InputParameterRegistry,
    execute: Arc<ExecuteFn>,
}

impl FnFunctionFactory {
    pub fn new<R, F>(name: &str, guid: Uuid, registry: InputParameterRegistry, execute: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&ExecuteContext<'_>, &mut FunctionArgs<'_>) -> Result<R, FunctionFault>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            guid,
            return_type: ItemTypeInfo::of::<R>(),
            registry,
            execute: Arc::new(
                move |ctx: &ExecuteContext<'_>, args: &mut FunctionArgs<'_>| {
                    execute(ctx, args).map(Item::new)
                },
            ),
        }
    }
}

impl Registered for FnFunctionFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn guid(&self) -> Uuid {
        self.guid
    }
}

impl FunctionFactory for FnFunctionFactory {
    fn return_type(&self) -> ItemTypeInfo {
        self.return_type
    }

    fn input_parameter_registry(&self) -> &InputParameterRegistry {
        &self.registry
    }

    fn create_function(&self, _: &FunctionCtorContext<'_>) -> Result<Box<dyn Function>, String> {
        Ok(Box::new(FnFunction {
            execute: self.execute.clone(),
        }))
    }
}

struct FnFunction {
    execute: Arc<ExecuteFn>,
}

impl Function for FnFunction {
    fn execute(
        &self,
        ctx: &ExecuteContext<'_>,
        args: &mut FunctionArgs<'_>,
    ) -> Result<Item, FunctionFault> {
        (self.execute)(ctx, args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallTarget {
    /// Intermediate result, consumed by the parent call.
    Stack(usize),
    /// Final result, written to the parameter block.
    Param(usize),
}

struct FunctionCall {
    factory: Arc<dyn FunctionFactory>,
    function: Arc<dyn Function>,
    param_name: String,
    args: Vec<usize>,
    target: CallTarget,
    debug_item_factory: Option<Arc<dyn ItemFactory>>,
}

/// Dependency-ordered list of the calls that fill a parameter block.
pub struct FunctionCallHierarchy {
    calls: Vec<FunctionCall>,
    stack_size: usize,
}

impl FunctionCallHierarchy {
    /// Flatten a resolved input tree, children before parents.
    pub fn build(root: &InputBlueprint) -> Self {
        let mut hierarchy = Self {
            calls: Vec::new(),
            stack_size: 0,
        };
        for input in root.children() {
            hierarchy.flatten(input, CallTarget::Param(input.param_offset()));
        }
        hierarchy
    }

    fn flatten(&mut self, node: &InputBlueprint, target: CallTarget) {
        let (Some(factory), Some(function)) = (node.function_factory(), node.function()) else {
            return;
        };

        let mut args = Vec::with_capacity(node.children().len());
        for child in node.children() {
            let slot = self.stack_size;
            self.stack_size += 1;
            self.flatten(child, CallTarget::Stack(slot));
            args.push(slot);
        }

        self.calls.push(FunctionCall {
            factory: factory.clone(),
            function: function.clone(),
            param_name: node.param_name().to_string(),
            args,
            target,
            debug_item_factory: node.debug_item_factory().cloned(),
        });
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run every call in order. Stops at the first fault.
    pub fn execute_all(
        &self,
        ctx: &ExecuteContext<'_>,
        out: &mut ParamsBlock,
    ) -> Result<(), FunctionFault> {
        let mut stack: Vec<Option<Item>> = (0..self.stack_size).map(|_| None).collect();

        for call in &self.calls {
            let name = call.factory.name();
            let values = call
                .args
                .iter()
                .map(|&slot| stack[slot].take())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| FunctionFault::new("argument was not computed").in_function(name))?;

            let mut args = FunctionArgs::new(call.factory.input_parameter_registry(), values);
            let result = call
                .function
                .execute(ctx, &mut args)
                .map_err(|fault| fault.in_function(name))?;

            tracing::trace!(function = name, param = %call.param_name, "executed function");
            if let Some(factory) = &call.debug_item_factory {
                if let Some(value) = factory.serialize_item(&result) {
                    tracing::debug!(function = name, param = %call.param_name, %value, "debug return value");
                }
            }

            match call.target {
                CallTarget::Stack(slot) => stack[slot] = Some(result),
                CallTarget::Param(offset) => {
                    out.set(offset, result).map_err(|fault| fault.in_function(name))?
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FunctionCallHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.calls.iter().map(|c| (c.factory.name(), c.target)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blackboard::Blackboard;
    use crate::schema::item::{TypedItemFactory, VariantDict};

    fn float_factory() -> Arc<dyn ItemFactory> {
        Arc::new(TypedItemFactory::<f32>::with_literal("float", Uuid::from_u128(1)))
    }

    #[test]
    fn leaf_names_and_guids_derive_from_item_type() {
        let literal = LeafFunctionFactory::new(LeafFunctionKind::Literal, float_factory());
        let param = LeafFunctionFactory::new(LeafFunctionKind::GlobalParam, float_factory());
        assert_eq!(literal.name(), "Literal<float>");
        assert_eq!(param.name(), "GlobalParam<float>");
        assert_ne!(literal.guid(), param.guid());
        assert_eq!(
            literal.guid(),
            LeafFunctionFactory::new(LeafFunctionKind::Literal, float_factory()).guid()
        );
    }

    #[test]
    fn literal_function_parses_at_creation() {
        let factory = LeafFunctionFactory::new(LeafFunctionKind::Literal, float_factory());
        assert!(factory
            .create_function(&FunctionCtorContext { param_or_return_value: "abc" })
            .is_err());

        let function = factory
            .create_function(&FunctionCtorContext { param_or_return_value: "1.5" })
            .unwrap();
        let blackboard = Blackboard::new(VariantDict::new());
        let ctx = ExecuteContext::new(&blackboard, 0);
        let registry = InputParameterRegistry::new();
        let mut args = FunctionArgs::new(&registry, Vec::new());
        let value = function.execute(&ctx, &mut args).unwrap();
        assert_eq!(value.downcast_ref::<f32>(), Some(&1.5));
    }

    #[test]
    fn global_param_function_reads_blackboard() {
        let item_factory = float_factory();
        let factory = LeafFunctionFactory::new(LeafFunctionKind::GlobalParam, item_factory.clone());
        let function = factory
            .create_function(&FunctionCtorContext { param_or_return_value: "Radius" })
            .unwrap();
        let registry = InputParameterRegistry::new();

        let empty = Blackboard::new(VariantDict::new());
        let mut args = FunctionArgs::new(&registry, Vec::new());
        let fault = function
            .execute(&ExecuteContext::new(&empty, 0), &mut args)
            .unwrap_err();
        assert!(fault.message().contains("Radius"));

        let radius = Item::new(7.0_f32);
        let mut dict = VariantDict::new();
        dict.add_or_replace("Radius", item_factory, &radius);
        let blackboard = Blackboard::new(dict);
        let value = function
            .execute(&ExecuteContext::new(&blackboard, 0), &mut args)
            .unwrap();
        assert_eq!(value.downcast_ref::<f32>(), Some(&7.0));
    }

    #[test]
    fn iterated_item_function_uses_current_index() {
        let factory = LeafFunctionFactory::new(LeafFunctionKind::IteratedItem, float_factory());
        let function = factory
            .create_function(&FunctionCtorContext { param_or_return_value: "" })
            .unwrap();
        let mut items = ItemList::new(ItemTypeInfo::of::<f32>());
        items.push(1.0_f32);
        items.push(2.0_f32);
        let blackboard = Blackboard::new(VariantDict::new()).with_iterated_items(&items);
        let registry = InputParameterRegistry::new();
        let mut args = FunctionArgs::new(&registry, Vec::new());

        let value = function
            .execute(&ExecuteContext::new(&blackboard, 1), &mut args)
            .unwrap();
        assert_eq!(value.downcast_ref::<f32>(), Some(&2.0));
        assert!(function
            .execute(&ExecuteContext::new(&blackboard, 5), &mut args)
            .is_err());
    }

    #[test]
    fn function_args_by_name() {
        let registry = InputParameterRegistry::new()
            .with::<f32>("A", "")
            .with::<f32>("B", "");
        let mut args = FunctionArgs::new(&registry, vec![Item::new(1.0_f32), Item::new(2.0_f32)]);
        assert_eq!(args.get::<f32>("B"), Ok(&2.0));
        assert!(args.get::<i32>("A").is_err());
        assert!(args.get::<f32>("C").is_err());
        assert_eq!(args.take::<f32>("A"), Ok(1.0));
        assert!(args.take::<f32>("A").is_err());
    }

    #[test]
    fn fault_display_names_function() {
        let fault = FunctionFault::new("division by zero").in_function("std::Divide");
        assert_eq!(fault.to_string(), "function 'std::Divide': division by zero");
        assert_eq!(fault.function(), Some("std::Divide"));
    }
}
