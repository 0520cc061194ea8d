pub mod blackboard;
pub mod builtins;
pub mod constant_params;
pub mod error;
pub mod function;
pub mod generator;
pub mod input;
pub mod logger;
pub mod query;
pub mod registry;
pub mod runtime_params;
