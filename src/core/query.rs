//! Query blueprints: the aggregate of constant params, runtime params and
//! generator for one query definition, linked to an optional parent.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::blackboard::Blackboard;
use crate::core::constant_params::{ConstantParam, GlobalConstantParamsBlueprint};
use crate::core::error::{BlueprintError, InstantiateError};
use crate::core::generator::{GeneratorBlueprint, GeneratorStatus, GeneratorUpdateContext};
use crate::core::logger::ConsoleLogger;
use crate::core::registry::Registries;
use crate::core::runtime_params::{GlobalRuntimeParamsBlueprint, RuntimeParam};
use crate::schema::item::{ItemList, ItemTypeInfo, VariantDict};
use crate::schema::textual::TextualQueryBlueprint;

pub struct QueryBlueprint {
    name: String,
    parent: Option<Arc<QueryBlueprint>>,
    shuttled_item_type: Option<ItemTypeInfo>,
    constant_params: GlobalConstantParamsBlueprint,
    runtime_params: GlobalRuntimeParamsBlueprint,
    generator: Option<GeneratorBlueprint>,
}

impl QueryBlueprint {
    /// Resolve constants, then runtime params against `parent`, then the
    /// generator against the query built so far.
    ///
    /// `parent` is fully resolved before its children, so the chain cannot
    /// form a cycle.
    pub fn resolve(
        source: &TextualQueryBlueprint,
        registries: &Registries,
        parent: Option<Arc<QueryBlueprint>>,
    ) -> Result<Self, BlueprintError> {
        let collector = source.error_collector.as_ref();

        let shuttled_item_type = match &source.shuttled_item_type {
            Some(type_ref) => {
                let factory = registries
                    .items
                    .find(&type_ref.guid, &type_ref.name)
                    .ok_or_else(|| {
                        BlueprintError::UnknownFactory {
                            kind: "ItemFactory",
                            guid: type_ref.guid.clone(),
                            name: type_ref.name.clone(),
                        }
                        .report(collector)
                    })?;
                Some(factory.item_type())
            }
            None => None,
        };

        let constant_params =
            GlobalConstantParamsBlueprint::resolve(&source.constant_params, registries)?;
        let runtime_params = GlobalRuntimeParamsBlueprint::resolve(
            &source.runtime_params,
            registries,
            parent.as_deref(),
        )?;
        check_param_kinds(&constant_params, &runtime_params, parent.as_deref())
            .map_err(|err| err.report(collector))?;

        let mut query = QueryBlueprint {
            name: source.name.clone(),
            parent,
            shuttled_item_type,
            constant_params,
            runtime_params,
            generator: None,
        };

        if let Some(generator) = &source.generator {
            let generator = GeneratorBlueprint::resolve(generator, registries, &query)?;
            query.generator = Some(generator);
        }

        tracing::debug!(query = %query.name, "resolved query blueprint");
        Ok(query)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&QueryBlueprint> {
        self.parent.as_deref()
    }

    pub fn shuttled_item_type(&self) -> Option<ItemTypeInfo> {
        self.shuttled_item_type
    }

    pub fn constant_params(&self) -> &GlobalConstantParamsBlueprint {
        &self.constant_params
    }

    pub fn runtime_params(&self) -> &GlobalRuntimeParamsBlueprint {
        &self.runtime_params
    }

    pub fn generator(&self) -> Option<&GeneratorBlueprint> {
        self.generator.as_ref()
    }

    /// This query followed by its ancestors, nearest first.
    pub fn chain(&self) -> impl Iterator<Item = &QueryBlueprint> {
        std::iter::successors(Some(self), |query| query.parent())
    }

    pub fn find_constant_param_recursively(&self, name: &str) -> Option<&ConstantParam> {
        self.chain().find_map(|query| query.constant_params.find(name))
    }

    pub fn find_runtime_param_recursively(&self, name: &str) -> Option<&RuntimeParam> {
        self.chain().find_map(|query| query.runtime_params.find(name))
    }

    /// Type of the constant or runtime parameter `name` visible from this
    /// query. A name is never both along one chain, so the nearest
    /// declaration is the one the blackboard will carry.
    pub fn find_global_param_type_recursively(&self, name: &str) -> Option<ItemTypeInfo> {
        self.chain().find_map(|query| {
            query
                .constant_params
                .find(name)
                .map(|param| param.factory().item_type())
                .or_else(|| {
                    query
                        .runtime_params
                        .find(name)
                        .map(|param| param.factory().item_type())
                })
        })
    }

    /// Verify that `runtime` supplies every runtime parameter declared along
    /// the chain, with the declared type.
    pub fn check_runtime_params(&self, runtime: &VariantDict<'_>) -> Result<(), InstantiateError> {
        self.chain()
            .try_for_each(|query| query.runtime_params.check_supplied(runtime))
    }

    /// Constants of the whole chain (nearer queries override ancestors),
    /// then the supplied runtime values.
    pub fn build_global_params<'a>(&'a self, runtime: &VariantDict<'a>) -> VariantDict<'a> {
        let mut dict = VariantDict::new();
        let chain: Vec<&QueryBlueprint> = self.chain().collect();
        for query in chain.into_iter().rev() {
            query.constant_params.add_self_to_dict_and_replace(&mut dict);
        }
        for (name, entry) in runtime.iter() {
            dict.add_or_replace(name, entry.factory.clone(), entry.item);
        }
        dict
    }

    /// Run the generator to completion and return what it produced.
    pub fn generate_items(
        &self,
        runtime: &VariantDict<'_>,
        shuttled_items: Option<&ItemList>,
    ) -> Result<ItemList, InstantiateError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| InstantiateError::NoGenerator(self.name.clone()))?;
        self.check_runtime_params(runtime)?;

        let mut blackboard = Blackboard::new(self.build_global_params(runtime));
        blackboard.shuttled_items = shuttled_items;

        let mut instance = generator.instantiate_generator(&blackboard)?;
        let mut items = ItemList::new(generator.factory().generated_item_type());
        let ctx = GeneratorUpdateContext {
            blackboard: &blackboard,
        };
        loop {
            let status = instance.update(&ctx, &mut items).map_err(|fault| {
                tracing::warn!(query = %self.name, %fault, "generator faulted");
                InstantiateError::GeneratorFault {
                    generator: generator.factory().name().to_string(),
                    fault,
                }
            })?;
            if status == GeneratorStatus::Finished {
                break;
            }
        }

        tracing::debug!(query = %self.name, items = items.len(), "generated items");
        Ok(items)
    }

    pub fn print_to_console(&self, logger: &mut ConsoleLogger) {
        logger.printf(format!("Query '{}'", self.name));
        logger.push_indent();
        if let Some(parent) = &self.parent {
            logger.printf(format!("Parent: {}", parent.name));
        }
        if let Some(shuttled) = self.shuttled_item_type {
            logger.printf(format!("Shuttled items: {}", shuttled));
        }
        self.constant_params.print_to_console(logger);
        self.runtime_params.print_to_console(logger);
        match &self.generator {
            Some(generator) => generator.print_to_console(logger),
            None => logger.printf("Generator: (none)"),
        }
        logger.pop_indent();
    }
}

/// A global parameter name is either a constant or a runtime parameter along
/// the whole chain, never both.
fn check_param_kinds(
    constant_params: &GlobalConstantParamsBlueprint,
    runtime_params: &GlobalRuntimeParamsBlueprint,
    parent: Option<&QueryBlueprint>,
) -> Result<(), BlueprintError> {
    let ancestors = || std::iter::successors(parent, |query| query.parent());
    for (name, _) in constant_params.iter() {
        let clash = runtime_params.find(name).is_some()
            || ancestors().any(|query| query.runtime_params.find(name).is_some());
        if clash {
            return Err(BlueprintError::ConstantRuntimeParamClash(name.to_string()));
        }
    }
    for (name, _) in runtime_params.iter() {
        if ancestors().any(|query| query.constant_params.find(name).is_some()) {
            return Err(BlueprintError::ConstantRuntimeParamClash(name.to_string()));
        }
    }
    Ok(())
}

impl fmt::Debug for QueryBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBlueprint")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("constant_params", &self.constant_params)
            .field("runtime_params", &self.runtime_params)
            .field("generator", &self.generator)
            .finish()
    }
}

/// Resolved query blueprints by name.
pub struct QueryBlueprintLibrary {
    registries: Arc<Registries>,
    queries: Vec<Arc<QueryBlueprint>>,
    by_name: FxHashMap<String, usize>,
}

impl QueryBlueprintLibrary {
    pub fn new(registries: Arc<Registries>) -> Self {
        Self {
            registries,
            queries: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// Resolve and store one query. Its parent must already be stored.
    pub fn add(&mut self, source: &TextualQueryBlueprint) -> Result<Arc<QueryBlueprint>, BlueprintError> {
        let collector = source.error_collector.as_ref();
        if self.by_name.contains_key(&source.name) {
            return Err(BlueprintError::DuplicateQuery(source.name.clone()).report(collector));
        }

        let parent = match &source.parent {
            Some(name) => Some(
                self.get(name)
                    .cloned()
                    .ok_or_else(|| BlueprintError::UnknownParent(name.clone()).report(collector))?,
            ),
            None => None,
        };

        let query = Arc::new(QueryBlueprint::resolve(source, &self.registries, parent)?);
        self.by_name.insert(query.name.clone(), self.queries.len());
        self.queries.push(query.clone());
        Ok(query)
    }

    /// Resolve a batch, parents before children regardless of input order.
    /// A failing query is skipped, and so are its descendants; the errors
    /// are returned by query name.
    pub fn add_all(&mut self, sources: &[TextualQueryBlueprint]) -> Vec<(String, BlueprintError)> {
        let mut errors = Vec::new();
        let mut pending: Vec<&TextualQueryBlueprint> = sources.iter().collect();

        loop {
            let before = pending.len();
            let mut deferred = Vec::new();
            for source in pending {
                let ready = source
                    .parent
                    .as_ref()
                    .map_or(true, |parent| self.by_name.contains_key(parent));
                if !ready {
                    deferred.push(source);
                } else if let Err(err) = self.add(source) {
                    errors.push((source.name.clone(), err));
                }
            }
            pending = deferred;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        // Whatever is left has a parent that never resolved.
        for source in pending {
            if let Err(err) = self.add(source) {
                errors.push((source.name.clone(), err));
            }
        }
        errors
    }

    pub fn get(&self, name: &str) -> Option<&Arc<QueryBlueprint>> {
        self.by_name.get(name).map(|&i| &self.queries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QueryBlueprint>> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl fmt::Debug for QueryBlueprintLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBlueprintLibrary")
            .field("queries", &self.queries.iter().map(|q| q.name()).collect::<Vec<_>>())
            .finish()
    }
}
