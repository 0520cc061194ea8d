//! Query Blueprint: resolution and instantiation of declarative item queries.
//!
//! A query is authored as a textual blueprint naming a generator, its inputs
//! and the constant/runtime parameters feeding them. Resolution binds every
//! reference to a registered factory and type-checks the whole tree once;
//! each query run then executes the resolved function-call hierarchy against
//! a blackboard to instantiate the generator.

pub mod core;
pub mod schema;

pub use crate::core::blackboard::{Blackboard, ExecuteContext};
pub use crate::core::error::{BlueprintError, InstantiateError};
pub use crate::core::function::FunctionFault;
pub use crate::core::query::{QueryBlueprint, QueryBlueprintLibrary};
pub use crate::core::registry::{Registered, Registries, RegistryError};
pub use crate::schema::item::{Item, ItemFactory, ItemList, ItemTypeInfo, VariantDict};
pub use crate::schema::syntax_error::{ErrorLog, SyntaxError};
pub use crate::schema::textual::TextualQueryBlueprint;
