//! The tool surface exposed to the model, and its local dispatcher.
//!
//! Every tool declares an explicit required-field set in its JSON
//! Schema; dispatch validates those fields before touching the runtime
//! or the store. File and shell tools run against the isolation runtime,
//! memory tools against the store. Failures of a single call are
//! reported back to the model as failed results; only an unrecoverable
//! runtime condition aborts the turn.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::agents::reporting;
use crate::error::ToolError;
use crate::isolation::{ExecOptions, IsolationRuntime};
use crate::llm::ToolDefinition;
use crate::memory::{Contact, JournalEntry, MemoryStore, questionnaire};

/// Reads larger than this are truncated in the tool result.
const MAX_READ_BYTES: usize = 256 * 1024;

/// Declared tool schema, in the order presented to the model.
pub fn tool_schema() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "bash",
            "Run a shell command inside the isolated session and return its output.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The command to run"},
                    "cwd": {"type": "string", "description": "Working directory"}
                },
                "required": ["command"]
            }),
        ),
        ToolDefinition::new(
            "editor",
            "View and edit files inside the session: view, create, str_replace, or insert.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "enum": ["view", "create", "str_replace", "insert"]
                    },
                    "path": {"type": "string"},
                    "file_text": {"type": "string", "description": "Content for create"},
                    "old_str": {"type": "string", "description": "Exact text to replace"},
                    "new_str": {"type": "string", "description": "Replacement or inserted text"},
                    "insert_line": {
                        "type": "integer",
                        "description": "Line after which to insert (0 = top)"
                    }
                },
                "required": ["command", "path"]
            }),
        ),
        ToolDefinition::new(
            "read_file",
            "Read a file from the session.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "write_file",
            "Write content to a file in the session, creating parents.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        ),
        ToolDefinition::new(
            "list_files",
            "List a directory in the session.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "add_contact",
            "Save a contact to the durable contact database.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"},
                    "relationship": {"type": "string"},
                    "conversation_style": {"type": "string"},
                    "notes": {"type": "string"}
                },
                "required": ["name"]
            }),
        ),
        ToolDefinition::new(
            "add_deadline",
            "Track a deadline; a four-stage microtask plan is generated automatically.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "due_date": {"type": "string", "description": "ISO-8601 timestamp"},
                    "description": {"type": "string"}
                },
                "required": ["title", "due_date"]
            }),
        ),
        ToolDefinition::new(
            "add_journal_entry",
            "Append an entry to the journal, with optional mood and energy (1-10).",
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "mood": {"type": "integer", "minimum": 1, "maximum": 10},
                    "energy": {"type": "integer", "minimum": 1, "maximum": 10}
                },
                "required": ["text"]
            }),
        ),
        ToolDefinition::new(
            "get_questionnaire",
            "Fetch a validated questionnaire's items by id (phq-9, gad-7).",
            json!({
                "type": "object",
                "properties": {"questionnaire_id": {"type": "string"}},
                "required": ["questionnaire_id"]
            }),
        ),
        ToolDefinition::new(
            "record_assessment",
            "Score a completed questionnaire and store the result with its trend.",
            json!({
                "type": "object",
                "properties": {
                    "questionnaire_id": {"type": "string"},
                    "answers": {
                        "type": "array",
                        "items": {"type": "integer", "minimum": 0, "maximum": 3}
                    }
                },
                "required": ["questionnaire_id", "answers"]
            }),
        ),
    ]
}

fn require_str<'a>(
    input: &'a Value,
    tool: &'static str,
    field: &'static str,
) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ToolError::MissingField { tool, field })
}

fn opt_str(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Executes declared tools against the runtime and the store.
pub struct ToolDispatcher {
    runtime: Arc<dyn IsolationRuntime>,
    memory: Arc<MemoryStore>,
    exec_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(runtime: Arc<dyn IsolationRuntime>, memory: Arc<MemoryStore>) -> Self {
        Self {
            runtime,
            memory,
            exec_timeout: crate::isolation::DEFAULT_EXEC_TIMEOUT,
        }
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Run one tool call. The returned string goes back to the model as
    /// the tool result.
    pub async fn dispatch(&self, name: &str, input: &Value) -> Result<String, ToolError> {
        match name {
            "bash" => self.bash(input).await,
            "editor" => self.editor(input).await,
            "read_file" => self.read_file(input).await,
            "write_file" => self.write_file(input).await,
            "list_files" => self.list_files(input).await,
            "add_contact" => self.add_contact(input).await,
            "add_deadline" => self.add_deadline(input).await,
            "add_journal_entry" => self.add_journal_entry(input).await,
            "get_questionnaire" => self.get_questionnaire(input),
            "record_assessment" => self.record_assessment(input).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn bash(&self, input: &Value) -> Result<String, ToolError> {
        let command = require_str(input, "bash", "command")?;
        let mut opts = ExecOptions::default().with_timeout(self.exec_timeout);
        if let Some(cwd) = opt_str(input, "cwd") {
            opts = opts.with_cwd(cwd);
        }

        let result = self.runtime.execute(command, opts).await?;
        let mut output = result.stdout;
        if !result.stderr.is_empty() {
            output.push_str("\n--- stderr ---\n");
            output.push_str(&result.stderr);
        }
        if result.exit_code != 0 {
            output.push_str(&format!("\n(exit code {})", result.exit_code));
        }
        Ok(output)
    }

    async fn editor(&self, input: &Value) -> Result<String, ToolError> {
        let command = require_str(input, "editor", "command")?;
        let path = require_str(input, "editor", "path")?;

        match command {
            "view" => {
                let bytes = self.runtime.read_file(path).await?;
                let text = String::from_utf8_lossy(&bytes);
                let numbered: String = text
                    .lines()
                    .enumerate()
                    .map(|(i, line)| format!("{:>6}\t{}\n", i + 1, line))
                    .collect();
                Ok(numbered)
            }
            "create" => {
                let file_text = require_str(input, "editor", "file_text")?;
                self.runtime.write_file(path, file_text.as_bytes()).await?;
                Ok(format!("created {}", path))
            }
            "str_replace" => {
                let old_str = require_str(input, "editor", "old_str")?;
                let new_str = opt_str(input, "new_str").unwrap_or_default();

                let bytes = self.runtime.read_file(path).await?;
                let text = String::from_utf8_lossy(&bytes).into_owned();

                let matches = text.matches(old_str).count();
                if matches == 0 {
                    return Err(ToolError::Failed(format!(
                        "old_str not found in {}",
                        path
                    )));
                }
                if matches > 1 {
                    return Err(ToolError::Failed(format!(
                        "old_str matches {} times in {}; provide more context",
                        matches, path
                    )));
                }

                let updated = text.replacen(old_str, &new_str, 1);
                self.runtime.write_file(path, updated.as_bytes()).await?;
                Ok(format!("replaced one occurrence in {}", path))
            }
            "insert" => {
                let insert_line = input
                    .get("insert_line")
                    .and_then(Value::as_u64)
                    .ok_or(ToolError::MissingField {
                        tool: "editor",
                        field: "insert_line",
                    })? as usize;
                let new_str = require_str(input, "editor", "new_str")?;

                let bytes = self.runtime.read_file(path).await?;
                let text = String::from_utf8_lossy(&bytes);
                let mut lines: Vec<&str> = text.lines().collect();
                if insert_line > lines.len() {
                    return Err(ToolError::Failed(format!(
                        "insert_line {} past end of {} ({} lines)",
                        insert_line,
                        path,
                        lines.len()
                    )));
                }
                lines.insert(insert_line, new_str);
                let mut updated = lines.join("\n");
                updated.push('\n');
                self.runtime.write_file(path, updated.as_bytes()).await?;
                Ok(format!("inserted after line {} in {}", insert_line, path))
            }
            other => Err(ToolError::InvalidField {
                tool: "editor",
                field: "command",
                reason: format!("unknown editor command '{}'", other),
            }),
        }
    }

    async fn read_file(&self, input: &Value) -> Result<String, ToolError> {
        let path = require_str(input, "read_file", "path")?;
        let bytes = self.runtime.read_file(path).await?;

        let truncated = bytes.len() > MAX_READ_BYTES;
        let slice = &bytes[..bytes.len().min(MAX_READ_BYTES)];
        let mut text = String::from_utf8_lossy(slice).into_owned();
        if truncated {
            text.push_str("\n... (truncated)");
        }
        Ok(text)
    }

    async fn write_file(&self, input: &Value) -> Result<String, ToolError> {
        let path = require_str(input, "write_file", "path")?;
        let content = require_str(input, "write_file", "content")?;
        self.runtime.write_file(path, content.as_bytes()).await?;
        Ok(format!("wrote {} bytes to {}", content.len(), path))
    }

    async fn list_files(&self, input: &Value) -> Result<String, ToolError> {
        let path = require_str(input, "list_files", "path")?;
        let entries = self.runtime.list_files(path).await?;

        if entries.is_empty() {
            return Ok(format!("{} is empty", path));
        }
        Ok(entries
            .iter()
            .map(|e| {
                if e.is_dir {
                    format!("{}/", e.name)
                } else {
                    format!("{} ({} bytes)", e.name, e.size)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn add_contact(&self, input: &Value) -> Result<String, ToolError> {
        let name = require_str(input, "add_contact", "name")?;

        let mut contact = Contact::new(name);
        contact.email = opt_str(input, "email");
        contact.relationship = opt_str(input, "relationship");
        contact.conversation_style = opt_str(input, "conversation_style");
        contact.notes = opt_str(input, "notes");

        let id = self.memory.add_contact(contact).await;
        Ok(format!("saved contact {} ({})", name, id))
    }

    async fn add_deadline(&self, input: &Value) -> Result<String, ToolError> {
        let title = require_str(input, "add_deadline", "title")?;
        let due_raw = require_str(input, "add_deadline", "due_date")?;
        let due = due_raw
            .parse::<chrono::DateTime<chrono::Utc>>()
            .map_err(|e| ToolError::InvalidField {
                tool: "add_deadline",
                field: "due_date",
                reason: e.to_string(),
            })?;
        let description = opt_str(input, "description").unwrap_or_default();

        let deadline = reporting::decompose(title, description, due);
        let phase = deadline.phase;
        let tasks = deadline.microtasks.len();
        let id = self.memory.add_deadline(deadline).await;

        Ok(format!(
            "tracking '{}' ({}), {:?} phase, {} microtasks planned",
            title, id, phase, tasks
        ))
    }

    async fn add_journal_entry(&self, input: &Value) -> Result<String, ToolError> {
        let text = require_str(input, "add_journal_entry", "text")?;

        let mut entry = JournalEntry::new(text);
        entry.mood = input.get("mood").and_then(Value::as_u64).map(|m| m as u8);
        entry.energy = input.get("energy").and_then(Value::as_u64).map(|e| e as u8);

        let id = self.memory.add_journal_entry(entry).await;
        Ok(format!("journal entry saved ({})", id))
    }

    fn get_questionnaire(&self, input: &Value) -> Result<String, ToolError> {
        let id = require_str(input, "get_questionnaire", "questionnaire_id")?;
        let instrument = questionnaire::get(id)?;

        let payload = json!({
            "id": instrument.id,
            "name": instrument.name,
            "scale": format!("0..={}", instrument.max_item_score),
            "items": instrument.items,
        });
        Ok(payload.to_string())
    }

    async fn record_assessment(&self, input: &Value) -> Result<String, ToolError> {
        let id = require_str(input, "record_assessment", "questionnaire_id")?;
        let answers: Vec<u8> = input
            .get("answers")
            .and_then(Value::as_array)
            .ok_or(ToolError::MissingField {
                tool: "record_assessment",
                field: "answers",
            })?
            .iter()
            .map(|v| v.as_u64().map(|n| n as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or(ToolError::InvalidField {
                tool: "record_assessment",
                field: "answers",
                reason: "answers must be integers".to_string(),
            })?;

        let result = self.memory.record_assessment(id, &answers).await?;
        Ok(format!(
            "{}: score {} ({}), trend {:?}",
            result.questionnaire_id, result.score, result.severity, result.trend
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::IsolationProfile;
    use crate::isolation::testing::FakeRuntime;
    use pretty_assertions::assert_eq;

    async fn dispatcher() -> (ToolDispatcher, Arc<FakeRuntime>, Arc<MemoryStore>) {
        let runtime = Arc::new(FakeRuntime::new());
        runtime
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::load(dir.path()).await.unwrap());
        (
            ToolDispatcher::new(runtime.clone(), Arc::clone(&memory)),
            runtime,
            memory,
        )
    }

    #[test]
    fn test_schema_declares_required_fields() {
        let schema = tool_schema();
        let bash = schema.iter().find(|t| t.name == "bash").unwrap();
        assert_eq!(bash.input_schema["required"], json!(["command"]));

        let assessment = schema.iter().find(|t| t.name == "record_assessment").unwrap();
        assert_eq!(
            assessment.input_schema["required"],
            json!(["questionnaire_id", "answers"])
        );
        assert_eq!(schema.len(), 10);
    }

    #[tokio::test]
    async fn test_bash_dispatch() {
        let (dispatcher, runtime, _) = dispatcher().await;
        let output = dispatcher
            .dispatch("bash", &json!({"command": "echo hi"}))
            .await
            .unwrap();
        assert_eq!(output, "hi\n");
        assert_eq!(runtime.executed.lock().unwrap().as_slice(), ["echo hi"]);
    }

    #[tokio::test]
    async fn test_missing_required_field_is_validation_error() {
        let (dispatcher, _, _) = dispatcher().await;
        let err = dispatcher.dispatch("bash", &json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::MissingField {
                tool: "bash",
                field: "command"
            }
        ));

        let err = dispatcher
            .dispatch("add_contact", &json!({"email": "x@y.z"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingField { field: "name", .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let (dispatcher, _, _) = dispatcher().await;
        let err = dispatcher.dispatch("teleport", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_editor_create_view_replace_insert() {
        let (dispatcher, _, _) = dispatcher().await;
        let path = "/workspace/notes.txt";

        dispatcher
            .dispatch(
                "editor",
                &json!({"command": "create", "path": path, "file_text": "alpha\nbeta\n"}),
            )
            .await
            .unwrap();

        let view = dispatcher
            .dispatch("editor", &json!({"command": "view", "path": path}))
            .await
            .unwrap();
        assert!(view.contains("1\talpha"));
        assert!(view.contains("2\tbeta"));

        dispatcher
            .dispatch(
                "editor",
                &json!({
                    "command": "str_replace",
                    "path": path,
                    "old_str": "beta",
                    "new_str": "gamma"
                }),
            )
            .await
            .unwrap();

        dispatcher
            .dispatch(
                "editor",
                &json!({
                    "command": "insert",
                    "path": path,
                    "insert_line": 1,
                    "new_str": "inserted"
                }),
            )
            .await
            .unwrap();

        let content = dispatcher
            .dispatch("read_file", &json!({"path": path}))
            .await
            .unwrap();
        assert_eq!(content, "alpha\ninserted\ngamma\n");
    }

    #[tokio::test]
    async fn test_str_replace_requires_unique_match() {
        let (dispatcher, _, _) = dispatcher().await;
        let path = "/workspace/dup.txt";
        dispatcher
            .dispatch(
                "editor",
                &json!({"command": "create", "path": path, "file_text": "x\nx\n"}),
            )
            .await
            .unwrap();

        let err = dispatcher
            .dispatch(
                "editor",
                &json!({"command": "str_replace", "path": path, "old_str": "x", "new_str": "y"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn test_memory_tools_roundtrip() {
        let (dispatcher, _, memory) = dispatcher().await;

        dispatcher
            .dispatch(
                "add_contact",
                &json!({"name": "Maya", "conversation_style": "casual"}),
            )
            .await
            .unwrap();
        assert!(memory.find_contact("maya").await.is_some());

        let due = (chrono::Utc::now() + chrono::TimeDelta::weeks(2)).to_rfc3339();
        let output = dispatcher
            .dispatch("add_deadline", &json!({"title": "paper", "due_date": due}))
            .await
            .unwrap();
        assert!(output.contains("Focusing"));
        assert_eq!(memory.deadlines().await[0].microtasks.len(), 4);

        dispatcher
            .dispatch(
                "add_journal_entry",
                &json!({"text": "solid day", "mood": 7}),
            )
            .await
            .unwrap();
        assert_eq!(memory.journal_entries().await[0].mood, Some(7));

        let items = dispatcher
            .dispatch("get_questionnaire", &json!({"questionnaire_id": "gad-7"}))
            .await
            .unwrap();
        assert!(items.contains("Trouble relaxing"));

        let scored = dispatcher
            .dispatch(
                "record_assessment",
                &json!({"questionnaire_id": "gad-7", "answers": [1, 1, 1, 0, 0, 0, 0]}),
            )
            .await
            .unwrap();
        assert!(scored.contains("score 3"));
    }

    #[tokio::test]
    async fn test_unknown_questionnaire_is_not_found() {
        let (dispatcher, _, _) = dispatcher().await;
        let err = dispatcher
            .dispatch("get_questionnaire", &json!({"questionnaire_id": "mmpi"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Memory(crate::error::MemoryError::NotFound { .. })
        ));
    }
}
