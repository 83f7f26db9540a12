use std::path::{Component, Path, PathBuf};

/// `git -c <key>=<val>` keys that hand control to another program.
const GIT_BLOCKED_CONFIG_KEYS: &[&str] = &[
    "core.sshcommand",
    "core.fsmonitor",
    "core.pager",
    "core.editor",
    "core.askpass",
    "credential.",
    "diff.external",
    "merge.tool",
    "filter.",
];

/// Filesystem and process limits for the built-in local tools.
#[derive(Debug, Clone)]
pub struct WorkspaceSandbox {
    pub workspace_dir: PathBuf,
    pub allowed_commands: Vec<String>,
}

impl WorkspaceSandbox {
    pub fn new(workspace_dir: impl Into<PathBuf>, allowed_commands: Vec<String>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            allowed_commands,
        }
    }

    /// Lexical check on a workspace-relative path: no traversal, no absolute paths.
    pub fn is_path_allowed(&self, path: &str) -> bool {
        if path.trim().is_empty() || path.contains('\0') {
            return false;
        }

        let lower = path.to_lowercase();
        if lower.contains("..%2f") || lower.contains("%2f..") {
            return false;
        }

        let candidate = Path::new(path);
        if candidate.is_absolute() || path.starts_with('~') {
            return false;
        }

        !candidate
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
    }

    /// Call after joining and canonicalizing; rejects symlink escapes.
    pub fn is_resolved_path_allowed(&self, resolved: &Path) -> bool {
        let root = self
            .workspace_dir
            .canonicalize()
            .unwrap_or_else(|_| self.workspace_dir.clone());
        resolved.starts_with(root)
    }

    /// Every command segment must start with an allow-listed binary, carry no
    /// blocked arguments, and name only workspace-relative paths. Subshells,
    /// redirections and backgrounding are refused outright.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        if command.contains('`')
            || command.contains("$(")
            || command.contains("${")
            || command.contains("<(")
            || command.contains(">(")
            || command.contains('>')
        {
            return false;
        }

        let mut normalized = command.to_string();
        for separator in ["&&", "||"] {
            normalized = normalized.replace(separator, "\x00");
        }
        if normalized.contains('&') {
            return false;
        }
        for separator in ['\n', ';', '|'] {
            normalized = normalized.replace(separator, "\x00");
        }

        let mut saw_command = false;
        for segment in normalized.split('\x00') {
            let segment = skip_env_assignments(segment.trim());
            let Some(program) = segment.split_whitespace().next() else {
                continue;
            };
            let base = program.rsplit('/').next().unwrap_or(program);
            if !self.allowed_commands.iter().any(|allowed| allowed == base) {
                return false;
            }
            let words = segment.split_whitespace().skip(1).collect::<Vec<_>>();
            if has_blocked_arguments(base, &words) || self.has_forbidden_path_argument(&words) {
                return false;
            }
            saw_command = true;
        }

        saw_command
    }

    fn has_forbidden_path_argument(&self, words: &[&str]) -> bool {
        words
            .iter()
            .map(|word| word.split_once('=').map_or(*word, |(_, value)| value))
            .filter(|arg| is_path_like_argument(arg))
            .any(|arg| !self.is_path_allowed(arg))
    }
}

fn is_path_like_argument(arg: &str) -> bool {
    if arg.contains("://") {
        return false;
    }
    arg.starts_with('/') || arg.starts_with('~') || arg.contains('/') || arg.contains("..")
}

fn is_git_config_injection(words: &[&str]) -> bool {
    let has_config_flag = words
        .iter()
        .any(|word| *word == "-c" || *word == "--config" || word.starts_with("--config="));
    has_config_flag
        && words.iter().any(|word| {
            let lower = word.to_lowercase();
            GIT_BLOCKED_CONFIG_KEYS.iter().any(|key| lower.contains(key))
        })
}

/// Subcommands and flags that reach the network, leak credentials or run
/// arbitrary programs through an otherwise allowed binary.
fn has_blocked_arguments(program: &str, words: &[&str]) -> bool {
    let subcommand = words.first().copied().unwrap_or("");
    match program {
        "git" => {
            if matches!(subcommand, "push" | "send-email" | "request-pull" | "credential") {
                return true;
            }
            if subcommand == "remote" {
                let action = words.get(1).copied().unwrap_or("");
                return !matches!(action, "" | "-v" | "show" | "get-url");
            }
            if subcommand == "config" {
                let writes_global = words.iter().any(|w| matches!(*w, "--global" | "--system"));
                let operands = words.iter().skip(1).filter(|w| !w.starts_with('-')).count();
                return writes_global || operands > 1;
            }
            if subcommand == "submodule" {
                return words.get(1).copied() == Some("add");
            }
            if words.iter().any(|w| {
                w.starts_with("--upload-pack")
                    || w.starts_with("--receive-pack")
                    || w.starts_with("--exec")
            }) {
                return true;
            }
            is_git_config_injection(words)
        }
        "npm" => matches!(
            subcommand,
            "publish" | "login" | "adduser" | "owner" | "token" | "access" | "profile"
        ),
        "cargo" => matches!(subcommand, "publish" | "login" | "owner" | "yank"),
        "find" => words
            .iter()
            .any(|w| matches!(*w, "-delete" | "-exec" | "-execdir" | "-ok" | "-okdir")),
        _ => false,
    }
}

fn skip_env_assignments(segment: &str) -> &str {
    let mut rest = segment;
    loop {
        let Some(word) = rest.split_whitespace().next() else {
            return rest;
        };
        let is_assignment = word.contains('=')
            && word
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !is_assignment {
            return rest;
        }
        rest = rest.trim_start()[word.len()..].trim_start();
    }
}
