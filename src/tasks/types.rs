use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent definition as returned by `GET /data/agents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AgentInput>,
}

impl Agent {
    pub fn input(&self, name: &str) -> Option<&AgentInput> {
        self.inputs.iter().find(|input| input.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: InputKind,
}

/// Declared input type. Anything that is not a file is sent as a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    File,
    #[default]
    #[serde(other)]
    Text,
}

/// One or more file ids, as uploaded to AI Studio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileRef {
    One(String),
    Many(Vec<String>),
}

impl FileRef {
    /// Accepts a string or an array of strings; anything else is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self::One(id.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::Many),
            _ => None,
        }
    }
}

/// An input as sent in `POST /data/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskInput {
    Value { name: String, value: Value },
    File { name: String, file: FileRef },
}

/// Options for a chat turn.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Code of a model to use instead of the agent's default.
    pub model: Option<String>,
}

/// Final state of a task, as delivered by the `taskReady` webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl TaskResponse {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }

    /// The errors for a failed task, the response otherwise.
    pub fn payload(&self) -> Value {
        let payload = if self.is_error() {
            self.errors.as_ref().or(self.response.as_ref())
        } else {
            self.response.as_ref()
        };
        payload.cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_inputs_default_to_text() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1",
            "inputs": [
                {"name": "topic"},
                {"name": "doc", "type": "file"},
                {"name": "count", "type": "number"}
            ]
        }))
        .unwrap();
        assert_eq!(agent.input("topic").unwrap().kind, InputKind::Text);
        assert_eq!(agent.input("doc").unwrap().kind, InputKind::File);
        assert_eq!(agent.input("count").unwrap().kind, InputKind::Text);
        assert!(agent.input("missing").is_none());
    }

    #[test]
    fn task_inputs_serialize_as_value_or_file() {
        let inputs = vec![
            TaskInput::Value {
                name: "topic".into(),
                value: json!("x"),
            },
            TaskInput::File {
                name: "doc".into(),
                file: FileRef::One("f-1".into()),
            },
            TaskInput::File {
                name: "pages".into(),
                file: FileRef::Many(vec!["f-2".into(), "f-3".into()]),
            },
        ];
        assert_eq!(
            serde_json::to_value(&inputs).unwrap(),
            json!([
                {"name": "topic", "value": "x"},
                {"name": "doc", "file": "f-1"},
                {"name": "pages", "file": ["f-2", "f-3"]}
            ])
        );
    }

    #[test]
    fn file_ref_rejects_non_strings() {
        assert!(FileRef::from_value(&json!(12)).is_none());
        assert!(FileRef::from_value(&json!({"id": "x"})).is_none());
        assert!(FileRef::from_value(&json!(["a", 1])).is_none());
        assert_eq!(
            FileRef::from_value(&json!(["a", "b"])),
            Some(FileRef::Many(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn error_payload_prefers_errors() {
        let failed = TaskResponse {
            task_id: "t1".into(),
            status: "error".into(),
            response: None,
            errors: Some(json!(["quota exceeded"])),
        };
        assert!(failed.is_error());
        assert_eq!(failed.payload(), json!(["quota exceeded"]));

        let ok = TaskResponse {
            task_id: "t1".into(),
            status: "success".into(),
            response: Some(json!({"text": "hi"})),
            errors: None,
        };
        assert!(!ok.is_error());
        assert_eq!(ok.payload(), json!({"text": "hi"}));
    }
}
