use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::coerce::{as_object, kind_of, object_field, scalar_string, string_field, string_list};
use crate::error::SchemaError;

/// Parsed user intent produced by the requirement analysis stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementContext {
    pub use_case: String,
    pub key_tasks: Vec<String>,
    pub tech_stack: Vec<String>,
    pub constraints: Vec<String>,
    pub ambiguities: Vec<String>,
}

impl RequirementContext {
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = as_object(value, "RequirementContext")?;

        Ok(Self {
            use_case: string_field(obj, "use_case"),
            key_tasks: string_list(obj.get("key_tasks")),
            tech_stack: string_list(obj.get("tech_stack")),
            constraints: string_list(obj.get("constraints")),
            ambiguities: string_list(obj.get("ambiguities")),
        })
    }
}

/// Abstract, human-readable workflow steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowPlan {
    pub steps: Vec<String>,
}

impl WorkflowPlan {
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = as_object(value, "WorkflowPlan")?;
        Ok(Self {
            steps: string_list(obj.get("steps")),
        })
    }
}

/// One plan step mapped onto a concrete component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentSpec {
    pub step: String,
    pub component_name: String,
    pub parameters: Map<String, Value>,
}

impl ComponentSpec {
    pub fn new(step: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            component_name: component_name.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = as_object(value, "ComponentSpec")?;

        let component_name = string_field(obj, "component_name");
        if component_name.trim().is_empty() {
            return Err(SchemaError::MissingField {
                record: "ComponentSpec",
                field: "component_name",
            });
        }

        Ok(Self {
            step: string_field(obj, "step"),
            component_name,
            parameters: object_field(obj, "parameters"),
        })
    }
}

/// Ordered component choices, one per plan step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentSelection {
    pub components: Vec<ComponentSpec>,
}

impl ComponentSelection {
    /// Parse a `{"components": [...]}` object. Malformed entries are skipped
    /// so one bad element does not discard the rest of the selection.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = as_object(value, "ComponentSelection")?;
        Ok(Self {
            components: component_list(obj.get("components"), "ComponentSelection")?,
        })
    }

    /// Keep only components whose name is in `available`.
    ///
    /// Returns the filtered selection together with the rejected names.
    pub fn retain_available(self, available: &BTreeSet<String>) -> (Self, Vec<String>) {
        let (kept, rejected): (Vec<_>, Vec<_>) = self
            .components
            .into_iter()
            .partition(|c| available.contains(&c.component_name));

        (
            Self { components: kept },
            rejected.into_iter().map(|c| c.component_name).collect(),
        )
    }
}

fn component_list(
    value: Option<&Value>,
    record: &'static str,
) -> Result<Vec<ComponentSpec>, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| match ComponentSpec::from_value(item) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!("Skipping malformed component entry: {}", e);
                    None
                }
            })
            .collect()),
        Some(other) => Err(SchemaError::WrongType {
            record,
            field: "components",
            expected: "an array",
            found: kind_of(other),
        }),
    }
}

/// Components after cost/performance review.
///
/// `needs_clarification` is derived from `ambiguities` on construction and
/// cannot be set independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizedPlan {
    components: Vec<ComponentSpec>,
    needs_clarification: bool,
    ambiguities: Vec<String>,
}

impl OptimizedPlan {
    pub fn new(components: Vec<ComponentSpec>, ambiguities: Vec<String>) -> Self {
        Self {
            needs_clarification: !ambiguities.is_empty(),
            components,
            ambiguities,
        }
    }

    /// Parse generator output. Any `needs_clarification` value it carries is
    /// ignored in favour of the ambiguity list.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = as_object(value, "OptimizedPlan")?;
        let components = component_list(obj.get("components"), "OptimizedPlan")?;
        let ambiguities = string_list(obj.get("ambiguities"));
        Ok(Self::new(components, ambiguities))
    }

    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    pub fn needs_clarification(&self) -> bool {
        self.needs_clarification
    }

    pub fn ambiguities(&self) -> &[String] {
        &self.ambiguities
    }

    pub fn into_parts(self) -> (Vec<ComponentSpec>, Vec<String>) {
        (self.components, self.ambiguities)
    }
}

/// Answers keyed by the exact question text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarificationAnswer {
    pub clarifications: BTreeMap<String, String>,
}

impl ClarificationAnswer {
    /// Every question mapped to an empty answer
    pub fn unanswered(questions: &[String]) -> Self {
        Self {
            clarifications: questions
                .iter()
                .map(|q| (q.clone(), String::new()))
                .collect(),
        }
    }

    /// Parse a `{"clarifications": {question: answer}}` object against the
    /// questions that were asked. Unasked keys are dropped and unanswered
    /// questions get an empty string.
    pub fn from_value(value: &Value, questions: &[String]) -> Result<Self, SchemaError> {
        let obj = as_object(value, "ClarificationAnswer")?;
        let answers = match obj.get("clarifications") {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(SchemaError::WrongType {
                    record: "ClarificationAnswer",
                    field: "clarifications",
                    expected: "an object",
                    found: kind_of(other),
                })
            }
            None => {
                return Err(SchemaError::MissingField {
                    record: "ClarificationAnswer",
                    field: "clarifications",
                })
            }
        };

        let clarifications = questions
            .iter()
            .map(|q| {
                let answer = answers.get(q).and_then(scalar_string).unwrap_or_default();
                (q.clone(), answer)
            })
            .collect();

        Ok(Self { clarifications })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requirement_context_defaults_missing_fields() {
        let ctx = RequirementContext::from_value(&json!({
            "use_case": "Retrieval QA over a git repo",
            "key_tasks": "Load the repository",
        }))
        .unwrap();

        assert_eq!(ctx.use_case, "Retrieval QA over a git repo");
        assert_eq!(ctx.key_tasks, vec!["Load the repository"]);
        assert!(ctx.tech_stack.is_empty());
        assert!(ctx.constraints.is_empty());
        assert!(ctx.ambiguities.is_empty());
    }

    #[test]
    fn test_plan_rejects_non_object() {
        assert!(WorkflowPlan::from_value(&json!("steps")).is_err());
        let plan = WorkflowPlan::from_value(&json!({})).unwrap();
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn test_selection_skips_entries_without_name() {
        let selection = ComponentSelection::from_value(&json!({
            "components": [
                {"step": "Load", "component_name": "GitLoader", "parameters": {"branch": "main"}},
                {"step": "Embed"},
                "not a component"
            ]
        }))
        .unwrap();

        assert_eq!(selection.components.len(), 1);
        assert_eq!(selection.components[0].component_name, "GitLoader");
        assert_eq!(selection.components[0].parameters["branch"], "main");
    }

    #[test]
    fn test_retain_available_filters_unknown_names() {
        let selection = ComponentSelection {
            components: vec![
                ComponentSpec::new("Load", "GitLoader"),
                ComponentSpec::new("Think", "MagicComponent"),
            ],
        };
        let available: BTreeSet<String> = ["GitLoader".to_string()].into_iter().collect();

        let (kept, rejected) = selection.retain_available(&available);
        assert_eq!(kept.components.len(), 1);
        assert_eq!(kept.components[0].component_name, "GitLoader");
        assert_eq!(rejected, vec!["MagicComponent"]);
    }

    #[test]
    fn test_optimized_plan_ignores_generator_flag() {
        let plan = OptimizedPlan::from_value(&json!({
            "components": [],
            "needs_clarification": true,
            "ambiguities": []
        }))
        .unwrap();
        assert!(!plan.needs_clarification());

        let plan = OptimizedPlan::from_value(&json!({
            "needs_clarification": false,
            "ambiguities": "Which embedding model?"
        }))
        .unwrap();
        assert!(plan.needs_clarification());
        assert_eq!(plan.ambiguities(), ["Which embedding model?"]);
        assert!(plan.components().is_empty());
    }

    #[test]
    fn test_clarifications_cover_every_question() {
        let questions = vec!["Which model?".to_string(), "Which store?".to_string()];
        let answer = ClarificationAnswer::from_value(
            &json!({"clarifications": {"Which model?": "gpt-4o-mini", "Unasked?": "x"}}),
            &questions,
        )
        .unwrap();

        assert_eq!(answer.clarifications.len(), 2);
        assert_eq!(answer.clarifications["Which model?"], "gpt-4o-mini");
        assert_eq!(answer.clarifications["Which store?"], "");

        assert!(ClarificationAnswer::from_value(&json!({"answers": {}}), &questions).is_err());
    }
}
