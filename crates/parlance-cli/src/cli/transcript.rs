//! Transcript loading.
//!
//! A `.toml` file holds `[[message]]` tables with `role` and `text`. Any other
//! file, or `-` for stdin, becomes a single assistant message.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use parlance_core::{ChatLog, Role};
use serde::Deserialize;

const STDIN_ARG: &str = "-";

const WELCOME: &[(Role, &str)] = &[
    (
        Role::System,
        "No transcript given. Pass markdown or `.toml` transcript files to view them.",
    ),
    (Role::User, "What can this viewer render?"),
    (
        Role::Assistant,
        "Most of **CommonMark** plus a few extensions:\n\n\
         - *emphasis*, **strong**, ~~strikethrough~~ and `inline code`\n\
         - [links](https://github.com) that stay clickable\n\
         - [x] task lists\n\n\
         | Key | Action |\n|-----|--------|\n| `t` | toggle dark/light |\n| `T` | next theme |\n\n\
         ```rust\nfn main() {\n    println!(\"click [copy] to grab this\");\n}\n```\n\n\
         > Scroll with the wheel or `j`/`k`. Press `q` to quit.",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read markdown from stdin")]
    Stdin(#[source] std::io::Error),
    #[error("failed to parse transcript {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RoleName {
    User,
    Assistant,
    System,
}

impl From<RoleName> for Role {
    fn from(value: RoleName) -> Self {
        match value {
            RoleName::User => Role::User,
            RoleName::Assistant => Role::Assistant,
            RoleName::System => Role::System,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    role: RoleName,
    text: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptFile {
    #[serde(default, rename = "message")]
    messages: Vec<Entry>,
}

#[derive(Debug, Default)]
pub struct Transcript {
    pub messages: Vec<(Role, String)>,
    /// Directory relative image paths resolve against.
    pub base_dir: Option<PathBuf>,
}

impl Transcript {
    pub fn welcome() -> Self {
        Self {
            messages: WELCOME
                .iter()
                .map(|(role, text)| (*role, (*text).to_string()))
                .collect(),
            base_dir: None,
        }
    }

    pub fn into_log(self) -> ChatLog {
        let mut log = ChatLog::new();
        for (role, text) in &self.messages {
            log.push(*role, text);
        }
        log
    }
}

/// Loads `files` in order. No files yields the welcome transcript.
pub fn load(files: &[PathBuf], mut stdin: impl Read) -> Result<Transcript, TranscriptError> {
    if files.is_empty() {
        return Ok(Transcript::welcome());
    }

    let mut transcript = Transcript {
        base_dir: files
            .iter()
            .find(|p| p.as_os_str() != STDIN_ARG)
            .and_then(|p| p.parent())
            .map(|dir| {
                if dir.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    dir.to_path_buf()
                }
            }),
        ..Transcript::default()
    };

    for path in files {
        if path.as_os_str() == STDIN_ARG {
            let mut text = String::new();
            stdin
                .read_to_string(&mut text)
                .map_err(TranscriptError::Stdin)?;
            transcript.messages.push((Role::Assistant, text));
            continue;
        }
        let text = fs::read_to_string(path).map_err(|source| TranscriptError::Read {
            path: path.clone(),
            source,
        })?;
        if is_transcript(path) {
            let file: TranscriptFile =
                toml::from_str(&text).map_err(|source| TranscriptError::Parse {
                    path: path.clone(),
                    source,
                })?;
            transcript
                .messages
                .extend(file.messages.into_iter().map(|e| (e.role.into(), e.text)));
        } else {
            transcript.messages.push((Role::Assistant, text));
        }
    }
    tracing::debug!(
        files = files.len(),
        messages = transcript.messages.len(),
        "loaded transcript"
    );
    Ok(transcript)
}

fn is_transcript(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
