//! The OpenAPI subset the runtime understands.
//!
//! Only what routing needs is modelled: paths, methods, `operationId`,
//! parameters and whether a request body is required. Paths keep their
//! document order.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use super::template::{PathTemplate, TemplateError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contract {
    #[serde(default)]
    pub openapi: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub paths: Vec<(String, PathItem)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub patch: Option<Operation>,
    pub head: Option<Operation>,
    pub options: Option<Operation>,
}

impl PathItem {
    /// `(METHOD, operation)` pairs in a fixed method order.
    pub fn operations(&self) -> Vec<(&'static str, &Operation)> {
        [
            ("GET", &self.get),
            ("PUT", &self.put),
            ("POST", &self.post),
            ("DELETE", &self.delete),
            ("PATCH", &self.patch),
            ("HEAD", &self.head),
            ("OPTIONS", &self.options),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
}

/// One thing wrong with a contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractProblem {
    #[error("{method} {path} has no operationId")]
    MissingOperationId { method: String, path: String },

    #[error("operationId '{0}' is used more than once")]
    DuplicateOperationId(String),

    #[error("path '{path}': {source}")]
    Template {
        path: String,
        #[source]
        source: TemplateError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("contract is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("contract has {} problem(s): {}", .0.len(), join(.0))]
    Invalid(Vec<ContractProblem>),
}

fn join(problems: &[ContractProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validated operation with its compiled path template.
#[derive(Debug, Clone)]
pub struct ContractOperation {
    pub method: &'static str,
    pub template: PathTemplate,
    pub operation_id: String,
    /// Path-level and operation-level parameters, operation entries winning.
    pub parameters: Vec<Parameter>,
    pub body_required: bool,
}

impl Contract {
    pub fn from_json(text: &str) -> Result<Self, ContractError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the whole document, reporting every problem found.
    pub fn operations(&self) -> Result<Vec<ContractOperation>, ContractError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        let mut operations = Vec::new();

        for (path, item) in &self.paths {
            let template = match PathTemplate::parse(path) {
                Ok(t) => Some(t),
                Err(source) => {
                    problems.push(ContractProblem::Template {
                        path: path.clone(),
                        source,
                    });
                    None
                }
            };

            for (method, op) in item.operations() {
                let Some(id) = op.operation_id.as_deref().filter(|id| !id.trim().is_empty())
                else {
                    problems.push(ContractProblem::MissingOperationId {
                        method: method.to_string(),
                        path: path.clone(),
                    });
                    continue;
                };
                if !seen.insert(id.to_string()) {
                    problems.push(ContractProblem::DuplicateOperationId(id.to_string()));
                    continue;
                }
                let Some(template) = &template else {
                    continue;
                };
                operations.push(ContractOperation {
                    method,
                    template: template.clone(),
                    operation_id: id.to_string(),
                    parameters: merge_parameters(&item.parameters, &op.parameters),
                    body_required: op.request_body.as_ref().is_some_and(|b| b.required),
                });
            }
        }

        if problems.is_empty() {
            Ok(operations)
        } else {
            Err(ContractError::Invalid(problems))
        }
    }
}

fn merge_parameters(path_level: &[Parameter], op_level: &[Parameter]) -> Vec<Parameter> {
    let mut merged: Vec<Parameter> = path_level
        .iter()
        .filter(|p| {
            !op_level
                .iter()
                .any(|o| o.name == p.name && o.location == p.location)
        })
        .cloned()
        .collect();
    merged.extend(op_level.iter().cloned());
    merged
}

fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct Ordered<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for Ordered<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of paths")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Ordered(PhantomData))
}
