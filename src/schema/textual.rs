//! Textual (intermediate) blueprints: loosely typed trees as produced by a
//! data loader, before any factory lookups or type checks happened.
//!
//! Types and functions are referenced by GUID string plus name. Nodes may
//! carry a [`SyntaxErrorCollector`]; resolution reports into it when present.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::syntax_error::{ErrorLog, SyntaxErrorCollector};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Reference to a registered item type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualTypeRef {
    pub name: String,
    pub guid: String,
}

impl TextualTypeRef {
    pub fn by_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            guid: String::new(),
        }
    }
}

/// One node of an input tree. The root node only groups the inputs of a
/// generator; every other node binds a parameter to a function call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualInputBlueprint {
    pub param_name: String,
    pub func_name: String,
    pub func_guid: String,
    /// Literal text for literal functions, the parameter name for global-param
    /// functions, empty otherwise.
    pub func_return_value: String,
    pub add_return_value_to_debug_render_world: bool,
    pub children: Vec<TextualInputBlueprint>,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

impl TextualInputBlueprint {
    pub fn new(param_name: &str, func_name: &str, func_return_value: &str) -> Self {
        Self {
            param_name: param_name.to_string(),
            func_name: func_name.to_string(),
            func_return_value: func_return_value.to_string(),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, child: TextualInputBlueprint) -> Self {
        self.children.push(child);
        self
    }

    fn attach_error_log(&mut self, log: &ErrorLog, location: &str) {
        let location = if self.param_name.is_empty() {
            location.to_string()
        } else {
            format!("{} > input '{}'", location, self.param_name)
        };
        for child in &mut self.children {
            child.attach_error_log(log, &location);
        }
        self.error_collector = Some(log.collector(location));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualGeneratorBlueprint {
    pub name: String,
    pub guid: String,
    pub input_root: TextualInputBlueprint,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualConstantParam {
    pub name: String,
    pub item_type: TextualTypeRef,
    pub value: String,
    pub add_to_debug_render_world: bool,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualGlobalConstantParamsBlueprint {
    pub params: Vec<TextualConstantParam>,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

impl TextualGlobalConstantParamsBlueprint {
    pub fn add(&mut self, name: &str, item_type: TextualTypeRef, value: &str) {
        self.params.push(TextualConstantParam {
            name: name.to_string(),
            item_type,
            value: value.to_string(),
            ..TextualConstantParam::default()
        });
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualRuntimeParam {
    pub name: String,
    pub item_type: TextualTypeRef,
    pub add_to_debug_render_world: bool,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualGlobalRuntimeParamsBlueprint {
    pub params: Vec<TextualRuntimeParam>,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

impl TextualGlobalRuntimeParamsBlueprint {
    pub fn add(&mut self, name: &str, item_type: TextualTypeRef) {
        self.params.push(TextualRuntimeParam {
            name: name.to_string(),
            item_type,
            ..TextualRuntimeParam::default()
        });
    }
}

/// A whole query definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextualQueryBlueprint {
    pub name: String,
    /// Name of an already loaded query this one inherits runtime parameters from.
    pub parent: Option<String>,
    /// Type of the items shuttled in from the enclosing query, if any.
    pub shuttled_item_type: Option<TextualTypeRef>,
    pub constant_params: TextualGlobalConstantParamsBlueprint,
    pub runtime_params: TextualGlobalRuntimeParamsBlueprint,
    pub generator: Option<TextualGeneratorBlueprint>,
    #[serde(skip)]
    pub error_collector: Option<SyntaxErrorCollector>,
}

impl TextualQueryBlueprint {
    /// Load a list of query blueprints from a RON file.
    pub fn load_list_from_ron(path: &Path) -> Result<Vec<TextualQueryBlueprint>, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron_list(&contents)
    }

    /// Parse a list of query blueprints from a RON string.
    pub fn parse_ron_list(input: &str) -> Result<Vec<TextualQueryBlueprint>, LoadError> {
        Ok(ron::from_str(input)?)
    }

    /// Parse a single query blueprint from a RON string.
    pub fn parse_ron(input: &str) -> Result<TextualQueryBlueprint, LoadError> {
        Ok(ron::from_str(input)?)
    }

    /// Attach a collector writing into `log` to every node of this blueprint.
    pub fn attach_error_log(&mut self, log: &ErrorLog) {
        let query = format!("query '{}'", self.name);

        for param in &mut self.constant_params.params {
            param.error_collector =
                Some(log.collector(format!("{} > constant param '{}'", query, param.name)));
        }
        self.constant_params.error_collector =
            Some(log.collector(format!("{} > constant params", query)));

        for param in &mut self.runtime_params.params {
            param.error_collector =
                Some(log.collector(format!("{} > runtime param '{}'", query, param.name)));
        }
        self.runtime_params.error_collector =
            Some(log.collector(format!("{} > runtime params", query)));

        if let Some(generator) = &mut self.generator {
            let location = format!("{} > generator '{}'", query, generator.name);
            generator.input_root.attach_error_log(log, &location);
            generator.error_collector = Some(log.collector(location));
        }

        self.error_collector = Some(log.collector(query));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_RON: &str = r#"(
        name: "FindCover",
        constant_params: (
            params: [
                (name: "MaxDistance", item_type: (name: "float"), value: "10.0"),
            ],
        ),
        runtime_params: (
            params: [
                (name: "Team", item_type: (name: "int", guid: "0b9c8a5e-0000-4000-8000-000000000002")),
            ],
        ),
        generator: Some((
            name: "PickClosest",
            input_root: (
                children: [
                    (param_name: "MaxDistance", func_name: "GlobalParam<float>", func_return_value: "MaxDistance"),
                ],
            ),
        )),
    )"#;

    #[test]
    fn parse_query_from_ron() {
        let query = TextualQueryBlueprint::parse_ron(QUERY_RON).unwrap();
        assert_eq!(query.name, "FindCover");
        assert!(query.parent.is_none());
        assert_eq!(query.constant_params.params.len(), 1);
        assert_eq!(query.constant_params.params[0].value, "10.0");
        assert_eq!(query.runtime_params.params[0].item_type.name, "int");
        let generator = query.generator.as_ref().unwrap();
        assert_eq!(generator.name, "PickClosest");
        assert_eq!(generator.input_root.children.len(), 1);
        assert!(generator.input_root.error_collector.is_none());
    }

    #[test]
    fn parse_list_from_ron() {
        let input = r#"[
            (name: "Base"),
            (name: "Derived", parent: Some("Base")),
        ]"#;
        let list = TextualQueryBlueprint::parse_ron_list(input).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].parent.as_deref(), Some("Base"));
    }

    #[test]
    fn attach_error_log_reaches_every_node() {
        let mut query = TextualQueryBlueprint::parse_ron(QUERY_RON).unwrap();
        let log = ErrorLog::new();
        query.attach_error_log(&log);

        let input = &query.generator.as_ref().unwrap().input_root.children[0];
        let collector = input.error_collector.as_ref().unwrap();
        assert_eq!(
            collector.location(),
            "query 'FindCover' > generator 'PickClosest' > input 'MaxDistance'"
        );
        collector.add_error_message("boom");
        assert_eq!(log.len(), 1);
        assert!(query.constant_params.params[0].error_collector.is_some());
        assert!(query.runtime_params.error_collector.is_some());
    }

    #[test]
    fn invalid_ron_is_an_error() {
        assert!(TextualQueryBlueprint::parse_ron("(name: ").is_err());
    }
}
