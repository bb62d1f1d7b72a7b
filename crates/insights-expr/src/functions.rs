//! Scalar function signatures used by `mutate`

use std::collections::HashMap;

use insights_ir::{DataType, ScalarFunction};

use crate::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Any,
    Textual,
    Numeric,
    Integer,
    Dated,
}

impl ArgClass {
    fn accepts(&self, data_type: DataType) -> bool {
        if data_type == DataType::Unknown {
            return true;
        }
        match self {
            ArgClass::Any => true,
            ArgClass::Textual => data_type.is_textual(),
            ArgClass::Numeric => data_type.is_numeric(),
            ArgClass::Integer => data_type == DataType::Integer,
            ArgClass::Dated => matches!(data_type, DataType::Date | DataType::Datetime),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Fixed(DataType),
    FirstArg,
}

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub func: ScalarFunction,
    pub args: Vec<ArgClass>,
    /// Last argument class repeats; at least one argument is still required
    pub variadic: bool,
    pub returns: Returns,
}

impl FunctionSignature {
    fn matches(&self, arg_types: &[DataType]) -> bool {
        if self.variadic {
            let Some(repeated) = self.args.last() else {
                return false;
            };
            !arg_types.is_empty()
                && arg_types.iter().enumerate().all(|(i, t)| {
                    self.args.get(i).unwrap_or(repeated).accepts(*t)
                })
        } else {
            self.args.len() == arg_types.len()
                && self.args.iter().zip(arg_types).all(|(class, t)| class.accepts(*t))
        }
    }

    fn return_type(&self, arg_types: &[DataType]) -> DataType {
        match self.returns {
            Returns::Fixed(t) => t,
            Returns::FirstArg => arg_types.first().copied().unwrap_or(DataType::Unknown),
        }
    }
}

pub struct FunctionRegistry {
    functions: HashMap<ScalarFunction, Vec<FunctionSignature>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        use ArgClass::*;

        for func in [ScalarFunction::Lower, ScalarFunction::Upper, ScalarFunction::Trim] {
            self.register(func, vec![Textual], false, Returns::Fixed(DataType::String));
        }
        self.register(ScalarFunction::Length, vec![Textual], false, Returns::Fixed(DataType::Integer));
        self.register(ScalarFunction::Concat, vec![Any], true, Returns::Fixed(DataType::String));
        self.register(ScalarFunction::Coalesce, vec![Any], true, Returns::FirstArg);

        self.register(ScalarFunction::Abs, vec![Numeric], false, Returns::FirstArg);
        self.register(ScalarFunction::Round, vec![Numeric], false, Returns::FirstArg);
        self.register(ScalarFunction::Round, vec![Numeric, Integer], false, Returns::FirstArg);

        for func in [ScalarFunction::Year, ScalarFunction::Month, ScalarFunction::Day] {
            self.register(func, vec![Dated], false, Returns::Fixed(DataType::Integer));
        }
    }

    pub fn register(&mut self, func: ScalarFunction, args: Vec<ArgClass>, variadic: bool, returns: Returns) {
        self.functions.entry(func).or_default().push(FunctionSignature {
            func,
            args,
            variadic,
            returns,
        });
    }

    /// Resolve the result type of `func` applied to `arg_types`
    pub fn resolve(&self, func: ScalarFunction, arg_types: &[DataType]) -> Result<DataType, ExprError> {
        let names: Vec<&str> = arg_types.iter().map(DataType::name).collect();
        self.functions
            .get(&func)
            .and_then(|overloads| overloads.iter().find(|sig| sig.matches(arg_types)))
            .map(|sig| sig.return_type(arg_types))
            .ok_or_else(|| ExprError::unsupported(func.name(), &names))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
