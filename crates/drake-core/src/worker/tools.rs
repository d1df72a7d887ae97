//! Tool-capability dispatch.
//!
//! Capabilities are a closed, tagged enum rather than a trait hierarchy: the
//! worker loop only ever needs to match on "which capability" and produce a
//! result string, and a fixed enum keeps every variant's input shape visible
//! in one place instead of scattered across `impl` blocks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::sandbox::{resolve_path, SandboxError};

const EDIT_PREVIEW_BYTES: usize = 400;
const RUN_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub enum ToolCall {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    AppendFile { path: String, content: String },
    EditFile { path: String, old_text: String, new_text: String },
    SearchCode { pattern: String },
    RunCommand { command: String, args: Vec<String> },
    AskUser { question: String },
    DisplayText { text: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("edit_file: no occurrence of old_text found in {path}; file preview: {preview}")]
    EditNoMatch { path: String, preview: String },
    #[error("edit_file: {count} occurrences of old_text found in {path}, expected exactly 1")]
    EditAmbiguous { path: String, count: usize },
    #[error("missing required field {0:?} in tool input")]
    MissingField(&'static str),
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
}

pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub allowed_external_paths: Vec<PathBuf>,
}

/// Parses a tool name and its input map (as received from a provider's
/// `ToolUse` block) into the corresponding [`ToolCall`].
pub fn parse_tool_call(name: &str, input: &HashMap<String, Value>) -> Result<ToolCall, ToolError> {
    let str_field = |key: &'static str| -> Result<String, ToolError> {
        input
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ToolError::MissingField(key))
    };

    Ok(match name {
        "read_file" => ToolCall::ReadFile { path: str_field("path")? },
        "write_file" => ToolCall::WriteFile {
            path: str_field("path")?,
            content: str_field("content")?,
        },
        "append_file" => ToolCall::AppendFile {
            path: str_field("path")?,
            content: str_field("content")?,
        },
        "edit_file" => ToolCall::EditFile {
            path: str_field("path")?,
            old_text: str_field("old_text")?,
            new_text: str_field("new_text")?,
        },
        "search_code" => ToolCall::SearchCode { pattern: str_field("pattern")? },
        "run_command" => ToolCall::RunCommand {
            command: str_field("command")?,
            args: input
                .get("args")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
        },
        "ask_user" => ToolCall::AskUser { question: str_field("question")? },
        "display_text" => ToolCall::DisplayText { text: str_field("text")? },
        other => return Err(ToolError::UnknownTool(other.to_string())),
    })
}

pub async fn dispatch(ctx: &ToolContext, call: ToolCall) -> Result<String, ToolError> {
    match call {
        ToolCall::ReadFile { path } => read_file(ctx, &path).await,
        ToolCall::WriteFile { path, content } => write_file(ctx, &path, &content).await,
        ToolCall::AppendFile { path, content } => append_file(ctx, &path, &content).await,
        ToolCall::EditFile { path, old_text, new_text } => edit_file(ctx, &path, &old_text, &new_text).await,
        ToolCall::SearchCode { pattern } => search_code(ctx, &pattern).await,
        ToolCall::RunCommand { command, args } => run_command(ctx, &command, &args).await,
        ToolCall::AskUser { question } => Ok(format!("[ask_user] {question}")),
        ToolCall::DisplayText { text } => Ok(text),
    }
}

async fn read_file(ctx: &ToolContext, path: &str) -> Result<String, ToolError> {
    let resolved = resolve_path(&ctx.workspace_root, path, &ctx.allowed_external_paths)?;
    Ok(tokio::fs::read_to_string(resolved).await?)
}

async fn write_file(ctx: &ToolContext, path: &str, content: &str) -> Result<String, ToolError> {
    let resolved = resolve_path(&ctx.workspace_root, path, &ctx.allowed_external_paths)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&resolved, content).await?;
    Ok(format!("wrote {} bytes to {path}", content.len()))
}

async fn append_file(ctx: &ToolContext, path: &str, content: &str) -> Result<String, ToolError> {
    use tokio::io::AsyncWriteExt;
    let resolved = resolve_path(&ctx.workspace_root, path, &ctx.allowed_external_paths)?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&resolved)
        .await?;
    file.write_all(content.as_bytes()).await?;
    Ok(format!("appended {} bytes to {path}", content.len()))
}

/// Requires `old_text` to occur exactly once in the file. Zero occurrences
/// returns a truncated preview of the file so the model can recalibrate;
/// more than one occurrence returns the count rather than guessing which one
/// was meant.
async fn edit_file(ctx: &ToolContext, path: &str, old_text: &str, new_text: &str) -> Result<String, ToolError> {
    let resolved = resolve_path(&ctx.workspace_root, path, &ctx.allowed_external_paths)?;
    let content = tokio::fs::read_to_string(&resolved).await?;
    let occurrences = content.matches(old_text).count();

    match occurrences {
        0 => Err(ToolError::EditNoMatch {
            path: path.to_string(),
            preview: truncate_preview(&content, EDIT_PREVIEW_BYTES),
        }),
        1 => {
            let updated = content.replacen(old_text, new_text, 1);
            tokio::fs::write(&resolved, &updated).await?;
            Ok(format!("edited {path}"))
        }
        n => Err(ToolError::EditAmbiguous { path: path.to_string(), count: n }),
    }
}

/// Truncates `text` to at most `max_bytes`, on a UTF-8 char boundary, and
/// appends a marker naming how much was cut.
fn truncate_preview(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...truncated, {} chars total", &text[..end], text.len())
}

async fn search_code(ctx: &ToolContext, pattern: &str) -> Result<String, ToolError> {
    let output = Command::new("grep")
        .arg("-rn")
        .arg("--")
        .arg(pattern)
        .arg(&ctx.workspace_root)
        .output()
        .await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs an arbitrary command with stdout/stderr captured concurrently and a
/// hard timeout, mirroring the invariant-runner's concurrent pipe-read.
async fn run_command(ctx: &ToolContext, command: &str, args: &[String]) -> Result<String, ToolError> {
    let mut child = Command::new(command)
        .args(args)
        .current_dir(&ctx.workspace_root)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let read_both = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let (stdout_res, stderr_res) = tokio::join!(
            stdout_pipe.read_to_string(&mut stdout),
            stderr_pipe.read_to_string(&mut stderr),
        );
        stdout_res?;
        stderr_res?;
        Ok::<_, std::io::Error>((stdout, stderr))
    };

    let result = tokio::time::timeout(RUN_COMMAND_TIMEOUT, async {
        let (stdout, stderr) = read_both.await?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((stdout, stderr, status))
    })
    .await;

    match result {
        Ok(Ok((stdout, stderr, status))) => Ok(format!(
            "exit status: {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
            status.code().unwrap_or(-1)
        )),
        Ok(Err(e)) => Err(ToolError::Io(e)),
        Err(_) => {
            let _ = child.start_kill();
            Err(ToolError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("command {command:?} timed out after {RUN_COMMAND_TIMEOUT:?}"),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(root: PathBuf) -> ToolContext {
        ToolContext {
            workspace_root: root,
            allowed_external_paths: vec![],
        }
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path().to_path_buf());
        dispatch(&ctx, ToolCall::WriteFile { path: "a.txt".into(), content: "hello".into() })
            .await
            .unwrap();
        let read = dispatch(&ctx, ToolCall::ReadFile { path: "a.txt".into() }).await.unwrap();
        assert_eq!(read, "hello");
    }

    #[tokio::test]
    async fn edit_file_requires_exactly_one_match() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path().to_path_buf());
        dispatch(
            &ctx,
            ToolCall::WriteFile {
                path: "a.txt".into(),
                content: "foo bar foo".into(),
            },
        )
        .await
        .unwrap();

        let err = edit_file(&ctx, "a.txt", "foo", "baz").await.unwrap_err();
        assert!(matches!(err, ToolError::EditAmbiguous { count: 2, .. }));
    }

    #[tokio::test]
    async fn edit_file_no_match_returns_truncated_preview() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path().to_path_buf());
        let long = "x".repeat(1000);
        dispatch(&ctx, ToolCall::WriteFile { path: "a.txt".into(), content: long }).await.unwrap();

        let err = edit_file(&ctx, "a.txt", "not present", "y").await.unwrap_err();
        match err {
            ToolError::EditNoMatch { preview, .. } => {
                assert!(preview.contains("truncated"));
                assert!(preview.contains("1000 chars total"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_file_single_match_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path().to_path_buf());
        dispatch(&ctx, ToolCall::WriteFile { path: "a.txt".into(), content: "foo bar".into() }).await.unwrap();
        edit_file(&ctx, "a.txt", "foo", "baz").await.unwrap();
        let read = dispatch(&ctx, ToolCall::ReadFile { path: "a.txt".into() }).await.unwrap();
        assert_eq!(read, "baz bar");
    }

    #[test]
    fn parse_tool_call_builds_edit_file_variant() {
        let mut input = HashMap::new();
        input.insert("path".to_string(), Value::String("a.txt".into()));
        input.insert("old_text".to_string(), Value::String("foo".into()));
        input.insert("new_text".to_string(), Value::String("bar".into()));
        let call = parse_tool_call("edit_file", &input).unwrap();
        assert!(matches!(call, ToolCall::EditFile { .. }));
    }

    #[test]
    fn parse_tool_call_rejects_missing_field() {
        let input = HashMap::new();
        let err = parse_tool_call("read_file", &input).unwrap_err();
        assert!(matches!(err, ToolError::MissingField(_)));
    }

    #[tokio::test]
    async fn write_file_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path().to_path_buf());
        let err = dispatch(
            &ctx,
            ToolCall::WriteFile {
                path: "../../etc/passwd".into(),
                content: "x".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)));
    }
}
