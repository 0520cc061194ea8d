//! Generators and the resolved generator blueprint.
//!
//! A [`GeneratorBlueprint`] binds a textual generator reference to a
//! registered [`GeneratorFactory`] and resolves its input tree once. Every
//! query run then calls [`GeneratorBlueprint::instantiate_generator`], which
//! executes the function-call hierarchy to fill a fresh [`ParamsBlock`] and
//! hands it to the factory.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::blackboard::{Blackboard, ExecuteContext};
use crate::core::error::{BlueprintError, InstantiateError};
use crate::core::function::{FunctionCallHierarchy, FunctionFault};
use crate::core::input::{InputBlueprint, InputParameterRegistry, InputResolveContext, ParamsBlock};
use crate::core::logger::ConsoleLogger;
use crate::core::query::QueryBlueprint;
use crate::core::registry::{Registered, Registries};
use crate::schema::item::{ItemList, ItemTypeInfo};
use crate::schema::textual::TextualGeneratorBlueprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    StillGenerating,
    Finished,
}

/// What a generator sees while producing items.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorUpdateContext<'a> {
    pub blackboard: &'a Blackboard<'a>,
}

/// A live generator, created per query run.
pub trait Generator: Send {
    /// Append items to `out`. Called until it reports `Finished`.
    fn update(
        &mut self,
        ctx: &GeneratorUpdateContext<'_>,
        out: &mut ItemList,
    ) -> Result<GeneratorStatus, FunctionFault>;
}

pub trait GeneratorFactory: Registered + Send + Sync {
    fn input_parameter_registry(&self) -> &Arc<InputParameterRegistry>;

    fn generated_item_type(&self) -> ItemTypeInfo;

    /// Type of the items this generator needs shuttled in, if any.
    fn expected_shuttled_item_type(&self) -> Option<ItemTypeInfo> {
        None
    }

    fn create_input_params(&self) -> ParamsBlock {
        ParamsBlock::new(self.input_parameter_registry().clone())
    }

    /// Never fails: inputs were type-checked at resolve time and filled by
    /// the caller.
    fn create_generator(&self, params: ParamsBlock) -> Box<dyn Generator>;
}

type CreateFn = dyn Fn(ParamsBlock) -> Box<dyn Generator> + Send + Sync;

/// Closure-backed generator factory.
pub struct FnGeneratorFactory {
    name: String,
    guid: Uuid,
    generated_item_type: ItemTypeInfo,
    expected_shuttled_item_type: Option<ItemTypeInfo>,
    registry: Arc<InputParameterRegistry>,
    create: Box<CreateFn>,
}

impl FnGeneratorFactory {
    /// A factory generating items of type `T`.
    pub fn new<T, F>(name: &str, guid: Uuid, registry: InputParameterRegistry, create: F) -> Self
    where
        T: Any,
        F: Fn(ParamsBlock) -> Box<dyn Generator> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            guid,
            generated_item_type: ItemTypeInfo::of::<T>(),
            expected_shuttled_item_type: None,
            registry: Arc::new(registry),
            create: Box::new(create),
        }
    }

    pub fn expecting_shuttled_items<S: Any>(mut self) -> Self {
        self.expected_shuttled_item_type = Some(ItemTypeInfo::of::<S>());
        self
    }
}

impl Registered for FnGeneratorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn guid(&self) -> Uuid {
        self.guid
    }
}

impl GeneratorFactory for FnGeneratorFactory {
    fn input_parameter_registry(&self) -> &Arc<InputParameterRegistry> {
        &self.registry
    }

    fn generated_item_type(&self) -> ItemTypeInfo {
        self.generated_item_type
    }

    fn expected_shuttled_item_type(&self) -> Option<ItemTypeInfo> {
        self.expected_shuttled_item_type
    }

    fn create_generator(&self, params: ParamsBlock) -> Box<dyn Generator> {
        (self.create)(params)
    }
}

pub struct GeneratorBlueprint {
    factory: Arc<dyn GeneratorFactory>,
    input: InputBlueprint,
    hierarchy: FunctionCallHierarchy,
}

impl GeneratorBlueprint {
    /// Bind `source` to a generator factory and resolve its inputs against
    /// `query`, which supplies global parameters and the shuttled item type.
    pub fn resolve(
        source: &TextualGeneratorBlueprint,
        registries: &Registries,
        query: &QueryBlueprint,
    ) -> Result<Self, BlueprintError> {
        let collector = source.error_collector.as_ref();

        let factory = registries
            .generators
            .find(&source.guid, &source.name)
            .cloned()
            .ok_or_else(|| {
                BlueprintError::UnknownFactory {
                    kind: "GeneratorFactory",
                    guid: source.guid.clone(),
                    name: source.name.clone(),
                }
                .report(collector)
            })?;

        if let Some(expected) = factory.expected_shuttled_item_type() {
            match query.shuttled_item_type() {
                None => {
                    return Err(BlueprintError::ShuttledItemsUnsupported {
                        user: format!("generator '{}'", factory.name()),
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
        }

        let owner = format!("generator '{}'", factory.name());
        let ctx = InputResolveContext {
            registries,
            query,
            allow_iterated_item: false,
            owner: &owner,
        };
        let input =
            InputBlueprint::resolve(&source.input_root, factory.input_parameter_registry(), &ctx)?;
        let hierarchy = FunctionCallHierarchy::build(&input);

        tracing::debug!(
            generator = factory.name(),
            calls = hierarchy.len(),
            "resolved generator blueprint"
        );
        Ok(Self {
            factory,
            input,
            hierarchy,
        })
    }

    pub fn factory(&self) -> &Arc<dyn GeneratorFactory> {
        &self.factory
    }

    pub fn input(&self) -> &InputBlueprint {
        &self.input
    }

    /// Fill a fresh parameter block from `blackboard` and create the
    /// generator. On a function fault the block is dropped and the factory
    /// is not asked for a generator.
    pub fn instantiate_generator(
        &self,
        blackboard: &Blackboard<'_>,
    ) -> Result<Box<dyn Generator>, InstantiateError> {
        let mut params = self.factory.create_input_params();
        // No items exist yet, so the item index is a placeholder.
        let ctx = ExecuteContext::new(blackboard, 0);

        if let Err(fault) = self.hierarchy.execute_all(&ctx, &mut params) {
            tracing::warn!(generator = self.factory.name(), %fault, "generator instantiation failed");
            return Err(InstantiateError::FunctionFault {
                generator: self.factory.name().to_string(),
                fault,
            });
        }

        tracing::debug!(generator = self.factory.name(), "instantiated generator");
        Ok(self.factory.create_generator(params))
    }

    pub fn print_to_console(&self, logger: &mut ConsoleLogger) {
        logger.printf(format!("Generator: {}", self.factory.name()));
        logger.push_indent();
        self.input.print_to_console(logger);
        logger.pop_indent();
    }
}

impl fmt::Debug for GeneratorBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorBlueprint")
            .field("factory", &self.factory.name())
            .field("input", &self.input)
            .field("hierarchy", &self.hierarchy)
            .finish()
    }
}
