//! Stock item types, functions and generators.

use std::sync::Arc;
use uuid::Uuid;

use crate::core::function::{FnFunctionFactory, FunctionFault};
use crate::core::generator::{FnGeneratorFactory, Generator, GeneratorStatus, GeneratorUpdateContext};
use crate::core::input::{InputParameterRegistry, ParamsBlock};
use crate::core::registry::{RegistryError, Registries};
use crate::schema::item::{ItemList, TypedItemFactory};

pub const FLOAT_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0001);
pub const INT_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0002);
pub const BOOL_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0003);
pub const STRING_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0004);

pub const ADD_FLOATS_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0101);
pub const CLAMP_FLOAT_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0102);

pub const FLOAT_RANGE_GUID: Uuid = Uuid::from_u128(0x5d1c_0a8e_52f1_4c36_9e0b_7c3a_0000_0201);

/// Register the stock item types (`float`, `int`, `bool`, `string`), the
/// `std::` functions and the `std::FloatRange` generator.
pub fn register_builtins(registries: &mut Registries) -> Result<(), RegistryError> {
    registries.register_item_factory(Arc::new(TypedItemFactory::<f32>::with_literal(
        "float", FLOAT_GUID,
    )))?;
    registries.register_item_factory(Arc::new(TypedItemFactory::<i32>::with_literal(
        "int", INT_GUID,
    )))?;
    registries.register_item_factory(Arc::new(TypedItemFactory::<bool>::with_literal(
        "bool", BOOL_GUID,
    )))?;
    registries.register_item_factory(Arc::new(TypedItemFactory::<String>::with_literal(
        "string",
        STRING_GUID,
    )))?;

    registries.register_function_factory(Arc::new(FnFunctionFactory::new(
        "std::AddFloats",
        ADD_FLOATS_GUID,
        InputParameterRegistry::new()
            .with::<f32>("A", "first summand")
            .with::<f32>("B", "second summand"),
        |_, args| Ok(args.get::<f32>("A")? + args.get::<f32>("B")?),
    )))?;

    registries.register_function_factory(Arc::new(FnFunctionFactory::new(
        "std::ClampFloat",
        CLAMP_FLOAT_GUID,
        InputParameterRegistry::new()
            .with::<f32>("Value", "value to clamp")
            .with::<f32>("Min", "lower bound")
            .with::<f32>("Max", "upper bound"),
        |_, args| {
            let (value, min, max) = (
                *args.get::<f32>("Value")?,
                *args.get::<f32>("Min")?,
                *args.get::<f32>("Max")?,
            );
            if min.is_nan() || max.is_nan() {
                return Err(FunctionFault::new(format!(
                    "bounds must be numbers, got Min ({}) and Max ({})",
                    min, max
                )));
            }
            if min > max {
                return Err(FunctionFault::new(format!(
                    "Min ({}) is greater than Max ({})",
                    min, max
                )));
            }
            Ok(value.clamp(min, max))
        },
    )))?;

    registries.register_generator_factory(Arc::new(FnGeneratorFactory::new::<f32, _>(
        "std::FloatRange",
        FLOAT_RANGE_GUID,
        InputParameterRegistry::new()
            .with::<f32>("Start", "first value")
            .with::<f32>("Step", "increment between values")
            .with::<i32>("Count", "number of values"),
        |params| -> Box<dyn Generator> { Box::new(FloatRange::from_params(params)) },
    )))?;

    tracing::debug!(
        items = registries.items.len(),
        functions = registries.functions.len(),
        generators = registries.generators.len(),
        "registered builtins"
    );
    Ok(())
}

struct FloatRange {
    start: f32,
    step: f32,
    count: i32,
}

impl FloatRange {
    fn from_params(mut params: ParamsBlock) -> Self {
        Self {
            start: params.take::<f32>("Start").unwrap_or_default(),
            step: params.take::<f32>("Step").unwrap_or_default(),
            count: params.take::<i32>("Count").unwrap_or_default(),
        }
    }
}

impl Generator for FloatRange {
    fn update(
        &mut self,
        _: &GeneratorUpdateContext<'_>,
        out: &mut ItemList,
    ) -> Result<GeneratorStatus, FunctionFault> {
        if self.count < 0 {
            return Err(FunctionFault::new(format!("negative Count: {}", self.count)));
        }
        for i in 0..self.count {
            out.push(self.start + self.step * i as f32);
        }
        Ok(GeneratorStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blackboard::{Blackboard, ExecuteContext};
    use crate::core::function::{FunctionArgs, FunctionCtorContext};
    use crate::schema::item::{Item, VariantDict};

    fn call(name: &str, inputs: Vec<Item>) -> Result<Item, FunctionFault> {
        let mut registries = Registries::new();
        register_builtins(&mut registries).unwrap();
        let factory = registries.functions.find_by_name(name).unwrap();
        let function = factory
            .create_function(&FunctionCtorContext { param_or_return_value: "" })
            .unwrap();
        let blackboard = Blackboard::new(VariantDict::new());
        let mut args = FunctionArgs::new(factory.input_parameter_registry(), inputs);
        function.execute(&ExecuteContext::new(&blackboard, 0), &mut args)
    }

    #[test]
    fn registers_items_and_leaf_functions() {
        let mut registries = Registries::new();
        register_builtins(&mut registries).unwrap();
        assert_eq!(registries.items.len(), 4);
        assert_eq!(registries.items.find_by_guid(&FLOAT_GUID).unwrap().name(), "float");
        assert!(registries.functions.find_by_name("Literal<string>").is_some());
        assert!(registries.generators.find_by_guid(&FLOAT_RANGE_GUID).is_some());
        assert!(register_builtins(&mut registries).is_err());
    }

    #[test]
    fn add_floats() {
        let sum = call("std::AddFloats", vec![Item::new(1.5_f32), Item::new(2.0_f32)]).unwrap();
        assert_eq!(sum.downcast_ref::<f32>(), Some(&3.5));
    }

    #[test]
    fn clamp_float_faults_on_inverted_bounds() {
        let clamped = call(
            "std::ClampFloat",
            vec![Item::new(12.0_f32), Item::new(0.0_f32), Item::new(10.0_f32)],
        )
        .unwrap();
        assert_eq!(clamped.downcast_ref::<f32>(), Some(&10.0));

        let fault = call(
            "std::ClampFloat",
            vec![Item::new(1.0_f32), Item::new(5.0_f32), Item::new(2.0_f32)],
        )
        .unwrap_err();
        assert!(fault.message().contains("greater than"));
    }

    #[test]
    fn clamp_float_faults_on_nan_bounds() {
        for (min, max) in [(f32::NAN, 10.0), (0.0, f32::NAN), (f32::NAN, f32::NAN)] {
            let fault = call(
                "std::ClampFloat",
                vec![Item::new(5.0_f32), Item::new(min), Item::new(max)],
            )
            .unwrap_err();
            assert!(fault.message().contains("must be numbers"), "{}", fault);
        }

        // A NaN value with valid bounds passes through.
        let clamped = call(
            "std::ClampFloat",
            vec![Item::new(f32::NAN), Item::new(0.0_f32), Item::new(1.0_f32)],
        )
        .unwrap();
        assert!(clamped.downcast_ref::<f32>().unwrap().is_nan());
    }
}
