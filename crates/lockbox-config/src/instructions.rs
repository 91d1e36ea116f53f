//! Instruction file (`app.lbox` / `lbox`) parsing
//!
//! Line-oriented, `#`-comment format. The original implementation split
//! `BOX_COPY src… dst` naively on whitespace, which breaks on paths
//! containing spaces; this parser instead uses shell-style splitting with
//! quoting (`shell_words`), which is a strict superset of the original's
//! accepted inputs and resolves spec.md's "open question" on that
//! ambiguity (see DESIGN.md).

use crate::{ConfigError, Result};
use std::path::{Path, PathBuf};

/// One parsed step of an instruction stream (everything after `BOX_BASE`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Copy { src: Vec<String>, dst: String },
    Exec { cmd: String },
    Env { key: String, value: String },
    Dir { path: String },
    Start { cmd: String },
}

/// A fully parsed instruction file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFile {
    pub base: String,
    pub steps: Vec<BuildStep>,
}

/// Candidate instruction file names, in lookup order
pub const INSTRUCTION_FILE_NAMES: &[&str] = &["app.lbox", "lbox"];

/// Locate the instruction file in a context directory: `app.lbox` first,
/// then `lbox`.
pub fn find_instruction_file(context_dir: &Path) -> Result<PathBuf> {
    for name in INSTRUCTION_FILE_NAMES {
        let candidate = context_dir.join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ConfigError::InstructionFileNotFound)
}

/// Parse an instruction file from its contents.
pub fn parse_instructions(content: &str) -> Result<InstructionFile> {
    let mut base: Option<String> = None;
    let mut steps = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (directive, rest) = match line.split_once(char::is_whitespace) {
            Some((d, r)) => (d, r.trim()),
            None => (line, ""),
        };

        match directive {
            "BOX_BASE" => {
                if rest.is_empty() {
                    return Err(parse_err(line_no, "BOX_BASE requires a tag"));
                }
                base = Some(rest.to_string());
            }
            "BOX_COPY" => {
                let tokens = shell_words::split(rest)
                    .map_err(|e| parse_err(line_no, &format!("bad BOX_COPY quoting: {e}")))?;
                if tokens.len() < 2 {
                    return Err(parse_err(line_no, "BOX_COPY requires src... and dst"));
                }
                let (dst, src) = tokens.split_last().unwrap();
                steps.push(BuildStep::Copy {
                    src: src.to_vec(),
                    dst: dst.clone(),
                });
            }
            "BOX_EXEC" => {
                if rest.is_empty() {
                    return Err(parse_err(line_no, "BOX_EXEC requires a command"));
                }
                steps.push(BuildStep::Exec {
                    cmd: rest.to_string(),
                });
            }
            "BOX_ENV" => {
                let (key, value) = rest
                    .split_once('=')
                    .ok_or_else(|| parse_err(line_no, "BOX_ENV requires KEY=VALUE"))?;
                steps.push(BuildStep::Env {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                });
            }
            "BOX_DIR" => {
                if rest.is_empty() {
                    return Err(parse_err(line_no, "BOX_DIR requires a path"));
                }
                steps.push(BuildStep::Dir {
                    path: rest.to_string(),
                });
            }
            "BOX_START" => {
                if rest.is_empty() {
                    return Err(parse_err(line_no, "BOX_START requires a command"));
                }
                steps.push(BuildStep::Start {
                    cmd: parse_start_command(rest),
                });
            }
            other => {
                return Err(parse_err(line_no, &format!("unknown directive '{other}'")));
            }
        }
    }

    let base = base.ok_or_else(|| parse_err(0, "missing BOX_BASE"))?;
    Ok(InstructionFile { base, steps })
}

/// `BOX_START` accepts either a bare shell command or a JSON list of
/// strings (`["python", "app.py"]`), joined with spaces when it parses as
/// a list.
fn parse_start_command(rest: &str) -> String {
    if rest.trim_start().starts_with('[') {
        if let Ok(parts) = serde_json::from_str::<Vec<String>>(rest) {
            return parts.join(" ");
        }
    }
    rest.to_string()
}

fn parse_err(line: usize, message: &str) -> ConfigError {
    ConfigError::InstructionParseError {
        line,
        message: message.to_string(),
    }
}

/// Load and parse the instruction file from a context directory.
pub fn load_instructions(context_dir: &Path) -> Result<InstructionFile> {
    let path = find_instruction_file(context_dir)?;
    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::InstructionReadError {
        path: path.clone(),
        source: e,
    })?;
    parse_instructions(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let src = r#"
# comment
BOX_BASE alpine

BOX_COPY app /app
BOX_EXEC pip install -r /app/requirements.txt
BOX_ENV PORT=5000
BOX_DIR /app
BOX_START python app.py
"#;
        let parsed = parse_instructions(src).unwrap();
        assert_eq!(parsed.base, "alpine");
        assert_eq!(parsed.steps.len(), 5);
        assert_eq!(
            parsed.steps[0],
            BuildStep::Copy {
                src: vec!["app".to_string()],
                dst: "/app".to_string()
            }
        );
        assert_eq!(
            parsed.steps[3],
            BuildStep::Dir {
                path: "/app".to_string()
            }
        );
        assert_eq!(
            parsed.steps[4],
            BuildStep::Start {
                cmd: "python app.py".to_string()
            }
        );
    }

    #[test]
    fn test_copy_quoted_paths_with_spaces() {
        let src = r#"
BOX_BASE alpine
BOX_COPY "my app" "/opt/my app"
"#;
        let parsed = parse_instructions(src).unwrap();
        assert_eq!(
            parsed.steps[0],
            BuildStep::Copy {
                src: vec!["my app".to_string()],
                dst: "/opt/my app".to_string()
            }
        );
    }

    #[test]
    fn test_copy_multiple_sources() {
        let src = "BOX_BASE alpine\nBOX_COPY a.txt b.txt /dst/\n";
        let parsed = parse_instructions(src).unwrap();
        assert_eq!(
            parsed.steps[0],
            BuildStep::Copy {
                src: vec!["a.txt".to_string(), "b.txt".to_string()],
                dst: "/dst/".to_string()
            }
        );
    }

    #[test]
    fn test_start_json_list_joined() {
        let src = r#"BOX_BASE alpine
BOX_START ["python", "app.py", "--port", "5000"]
"#;
        let parsed = parse_instructions(src).unwrap();
        assert_eq!(
            parsed.steps[0],
            BuildStep::Start {
                cmd: "python app.py --port 5000".to_string()
            }
        );
    }

    #[test]
    fn test_missing_base_is_error() {
        let src = "BOX_COPY a b\n";
        assert!(parse_instructions(src).is_err());
    }

    #[test]
    fn test_unknown_directive_is_error() {
        let src = "BOX_BASE alpine\nBOX_FROBNICATE x\n";
        assert!(parse_instructions(src).is_err());
    }

    #[test]
    fn test_env_parses_key_value() {
        let src = "BOX_BASE alpine\nBOX_ENV FOO=bar baz\n";
        let parsed = parse_instructions(src).unwrap();
        assert_eq!(
            parsed.steps[0],
            BuildStep::Env {
                key: "FOO".to_string(),
                value: "bar baz".to_string()
            }
        );
    }

    #[test]
    fn test_find_instruction_file_prefers_app_lbox() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("lbox"), "BOX_BASE alpine\n").unwrap();
        std::fs::write(tmp.path().join("app.lbox"), "BOX_BASE alpine\n").unwrap();
        let found = find_instruction_file(tmp.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "app.lbox");
    }

    #[test]
    fn test_find_instruction_file_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_instruction_file(tmp.path()).is_err());
    }
}
