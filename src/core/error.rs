//! Error types shared by the resolvers and the instantiation path.

use thiserror::Error;

use crate::core::function::FunctionFault;
use crate::schema::syntax_error::SyntaxErrorCollector;

/// Resolution failure. The query definition that produced it must be
/// rejected as a whole.
#[derive(Debug, Clone, Error)]
pub enum BlueprintError {
    #[error("Unknown {kind}: GUID={guid}, name='{name}'")]
    UnknownFactory {
        kind: &'static str,
        guid: String,
        name: String,
    },
    #[error("Duplicate parameter: '{0}'")]
    DuplicateParam(String),
    #[error("Type mismatch for parameter '{param}': parent query declares {parent_type}, but it is re-declared as {child_type}")]
    TypeMismatch {
        param: String,
        parent_type: String,
        child_type: String,
    },
    #[error("Global parameter '{0}' is declared both as a constant and as a runtime parameter")]
    ConstantRuntimeParamClash(String),
    #[error("Shuttled item type mismatch: the generator expects {expected}, but the query provides {provided}")]
    ShuttleTypeMismatch { expected: String, provided: String },
    #[error("{user} expects shuttled items of type {expected}, but the query has no shuttled items in this context")]
    ShuttledItemsUnsupported { user: String, expected: String },
    #[error("Parameter '{param}': item type '{type_name}' cannot be represented as a literal")]
    NotSerializable { param: String, type_name: String },
    #[error("Parameter '{param}': could not parse '{value}': {message}")]
    Deserialization {
        param: String,
        value: String,
        message: String,
    },
    #[error("Missing input parameter '{param}' for {owner}")]
    MissingInput { param: String, owner: String },
    #[error("Unknown input parameter '{param}' for {owner}")]
    UnknownInput { param: String, owner: String },
    #[error("Input '{param}': function '{function}' returns {actual}, but the parameter expects {expected}")]
    ReturnTypeMismatch {
        param: String,
        function: String,
        expected: String,
        actual: String,
    },
    #[error("Input '{param}': function '{function}' yields items of type {actual}, but the list holds {expected}")]
    ListElementTypeMismatch {
        param: String,
        function: String,
        expected: String,
        actual: String,
    },
    #[error("Input '{param}': unknown global parameter '{global}'")]
    UnknownGlobalParam { param: String, global: String },
    #[error("Input '{param}': global parameter '{global}' is of type {actual}, but {expected} is required")]
    GlobalParamTypeMismatch {
        param: String,
        global: String,
        expected: String,
        actual: String,
    },
    #[error("Input '{param}': function '{function}' reads the iterated item, which is not available here")]
    IteratedItemUnavailable { param: String, function: String },
    #[error("Input '{param}': function '{function}' could not be created: {message}")]
    FunctionCreation {
        param: String,
        function: String,
        message: String,
    },
    #[error("Unknown parent query: '{0}'")]
    UnknownParent(String),
    #[error("Query '{0}' is already defined")]
    DuplicateQuery(String),
}

impl BlueprintError {
    /// Forward the message to `collector` (if any) and hand the error back.
    pub(crate) fn report(self, collector: Option<&SyntaxErrorCollector>) -> Self {
        if let Some(collector) = collector {
            collector.add_error_message(self.to_string());
        }
        self
    }
}

/// Failure of one query run. The engine carries on; only that run fails.
#[derive(Debug, Clone, Error)]
pub enum InstantiateError {
    #[error("generator '{generator}': {fault}")]
    FunctionFault {
        generator: String,
        #[source]
        fault: FunctionFault,
    },
    #[error("generator '{generator}' failed while generating items: {fault}")]
    GeneratorFault {
        generator: String,
        #[source]
        fault: FunctionFault,
    },
    #[error("runtime parameter '{0}' was not supplied")]
    MissingRuntimeParam(String),
    #[error("runtime parameter '{name}' is of type {actual}, but {expected} is required")]
    RuntimeParamTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("query blueprint '{0}' has no generator")]
    NoGenerator(String),
}
