use serde_json::{Map, Value};

use crate::errors::AgentError;
use crate::models::tool::ToolInvocation;

/// Rebuilds one tool invocation's input from streamed JSON fragments.
///
/// Fragments are only buffered; nothing is parsed until `finish`, so partial
/// fragments that are not valid JSON on their own never cause a failure.
#[derive(Debug)]
pub struct ToolCallAssembler {
    id: String,
    name: String,
    buffer: String,
}

/// The result of finishing an assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCall {
    pub invocation: ToolInvocation,
    /// Set when the buffered input could not be used and `{}` was substituted
    pub warning: Option<AgentError>,
}

impl ToolCallAssembler {
    pub fn open<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            buffer: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_input(&self) -> &str {
        &self.buffer
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    pub fn finish(self) -> AssembledCall {
        let (input, warning) = match parse_input(&self.buffer) {
            Ok(input) => (input, None),
            Err(reason) => {
                tracing::warn!(
                    tool = %self.name,
                    id = %self.id,
                    raw = %self.buffer,
                    "tool input did not parse, continuing with empty arguments: {}",
                    reason
                );
                (
                    Value::Object(Map::new()),
                    Some(AgentError::ToolInputParse {
                        tool: self.name.clone(),
                        reason,
                    }),
                )
            }
        };

        AssembledCall {
            invocation: ToolInvocation {
                id: self.id,
                name: self.name,
                input,
            },
            warning,
        }
    }
}

fn parse_input(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind_of(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assemble(fragments: &[&str]) -> AssembledCall {
        let mut assembler = ToolCallAssembler::open("toolu_1", "generate_job_description");
        for fragment in fragments {
            assembler.push(fragment);
        }
        assembler.finish()
    }

    #[test]
    fn test_fragments_join_into_object() {
        let call = assemble(&[r#"{"job_ti"#, r#"tle":"Eng"}"#]);
        assert_eq!(call.invocation.input, json!({"job_title": "Eng"}));
        assert_eq!(call.invocation.id, "toolu_1");
        assert_eq!(call.invocation.name, "generate_job_description");
        assert!(call.warning.is_none());
    }

    #[test]
    fn test_unterminated_object_falls_back_to_empty() {
        let call = assemble(&[r#"{"a":"#]);
        assert_eq!(call.invocation.input, json!({}));
        assert!(matches!(
            call.warning,
            Some(AgentError::ToolInputParse { ref tool, .. }) if tool == "generate_job_description"
        ));
    }

    #[test]
    fn test_no_fragments_is_empty_object_without_warning() {
        let call = assemble(&[]);
        assert_eq!(call.invocation.input, json!({}));
        assert!(call.warning.is_none());
    }

    #[test]
    fn test_non_object_input_is_rejected() {
        let call = assemble(&["[1, 2]"]);
        assert_eq!(call.invocation.input, json!({}));
        assert!(call.warning.is_some());
    }

    #[test]
    fn test_split_points_do_not_change_result() {
        let full = r#"{"requirements":["Rust","Tokio"],"company":"Acme","remote":true}"#;
        let expected: Value = serde_json::from_str(full).unwrap();

        for split in 0..=full.len() {
            let (left, right) = full.split_at(split);
            let call = assemble(&[left, right]);
            assert_eq!(call.invocation.input, expected, "split at {}", split);
        }

        let chars: Vec<String> = full.chars().map(String::from).collect();
        let pieces: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(assemble(&pieces).invocation.input, expected);
    }

    #[test]
    fn test_raw_input_tracks_fragments() {
        let mut assembler = ToolCallAssembler::open("id", "name");
        assembler.push("{\"a\"");
        assembler.push(":1}");
        assert_eq!(assembler.raw_input(), "{\"a\":1}");
        assert_eq!(assembler.id(), "id");
        assert_eq!(assembler.name(), "name");
    }
}
