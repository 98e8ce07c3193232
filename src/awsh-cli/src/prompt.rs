//! Prompt rendering and the lazily refreshed context cache.
//!
//! Reading git and kube state on every prompt render would make the prompt
//! feel sticky, so the cache holds results for a short TTL and refreshes on
//! the first render after expiry. A `cd` invalidates it outright.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::backend::BackendStatus;
use crate::supervisor::Health;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub git_branch: Option<String>,
    pub kube_context: Option<String>,
    pub kube_namespace: Option<String>,
}

pub struct ContextCache {
    ttl: Duration,
    fetched: Option<Instant>,
    context: PromptContext,
    kube_config: PathBuf,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        let kube_config = dirs::home_dir()
            .map(|home| home.join(".kube/config"))
            .unwrap_or_default();
        Self {
            ttl,
            fetched: None,
            context: PromptContext::default(),
            kube_config,
        }
    }

    pub fn current(&mut self, cwd: &Path) -> &PromptContext {
        let stale = self.fetched.is_none_or(|at| at.elapsed() >= self.ttl);
        if stale {
            let (kube_context, kube_namespace) = read_kube_context(&self.kube_config);
            self.context = PromptContext {
                git_branch: read_git_branch(cwd),
                kube_context,
                kube_namespace,
            };
            self.fetched = Some(Instant::now());
            debug!(context = ?self.context, "prompt context refreshed");
        }
        &self.context
    }

    /// Drop the cached values; the next render refetches.
    pub fn invalidate(&mut self) {
        self.fetched = None;
    }
}

/// Branch name from `.git/HEAD`, walking up from `cwd`. A detached HEAD
/// shows as a short hash.
fn read_git_branch(cwd: &Path) -> Option<String> {
    for dir in cwd.ancestors() {
        let head = dir.join(".git/HEAD");
        let Ok(content) = std::fs::read_to_string(&head) else {
            continue;
        };
        let content = content.trim();
        return Some(match content.strip_prefix("ref: refs/heads/") {
            Some(branch) => branch.to_owned(),
            None => content.chars().take(8).collect(),
        });
    }
    None
}

/// Current context and its namespace from a kubeconfig file.
fn read_kube_context(config_path: &Path) -> (Option<String>, Option<String>) {
    let Ok(content) = std::fs::read_to_string(config_path) else {
        return (None, None);
    };
    let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
        return (None, None);
    };
    let current = doc
        .get("current-context")
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    let namespace = current.as_deref().and_then(|name| {
        doc.get("contexts")?
            .as_sequence()?
            .iter()
            .find(|entry| entry.get("name").and_then(|n| n.as_str()) == Some(name))?
            .get("context")?
            .get("namespace")?
            .as_str()
            .map(str::to_owned)
    });
    (current, namespace)
}

/// Build the prompt line: health glyphs, `user@host:cwd`, git and kube
/// context, `#` for root.
pub fn render(
    user: &str,
    host: &str,
    cwd: &Path,
    home: Option<&Path>,
    context: &PromptContext,
    health: Health,
    backend: BackendStatus,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("ai:");
    prompt.push_str(match backend {
        BackendStatus::Ready => "✓",
        BackendStatus::Loading => "…",
        BackendStatus::Unreachable => "✗",
    });
    if !health.sandbox {
        prompt.push_str(" sb:✗");
    }
    if !health.proxy {
        prompt.push_str(" px:✗");
    }
    prompt.push(' ');

    prompt.push_str(user);
    prompt.push('@');
    prompt.push_str(host);
    prompt.push(':');
    prompt.push_str(&abbreviate_home(cwd, home));

    if let Some(branch) = &context.git_branch {
        prompt.push_str(&format!(" ({branch})"));
    }
    if let Some(kube) = &context.kube_context {
        match &context.kube_namespace {
            Some(ns) => prompt.push_str(&format!(" {{{kube}/{ns}}}")),
            None => prompt.push_str(&format!(" {{{kube}}}")),
        }
    }

    prompt.push_str(if user == "root" { " # " } else { " $ " });
    prompt
}

fn abbreviate_home(cwd: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if let Ok(rest) = cwd.strip_prefix(home) {
            return if rest.as_os_str().is_empty() {
                "~".to_owned()
            } else {
                format!("~/{}", rest.display())
            };
        }
    }
    cwd.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn all_up() -> Health {
        Health {
            sandbox: true,
            proxy: true,
            backend: true,
        }
    }

    #[test]
    fn renders_the_basic_line() {
        let prompt = render(
            "alice",
            "box",
            Path::new("/home/alice/src"),
            Some(Path::new("/home/alice")),
            &PromptContext::default(),
            all_up(),
            BackendStatus::Ready,
        );
        assert_eq!(prompt, "ai:✓ alice@box:~/src $ ");
    }

    #[test]
    fn root_gets_a_hash_sigil() {
        let prompt = render(
            "root",
            "box",
            Path::new("/etc"),
            None,
            &PromptContext::default(),
            all_up(),
            BackendStatus::Loading,
        );
        assert_eq!(prompt, "ai:… root@box:/etc # ");
    }

    #[test]
    fn shows_git_and_kube_context() {
        let context = PromptContext {
            git_branch: Some("main".to_owned()),
            kube_context: Some("prod".to_owned()),
            kube_namespace: Some("web".to_owned()),
        };
        let prompt = render(
            "alice",
            "box",
            Path::new("/home/alice"),
            Some(Path::new("/home/alice")),
            &context,
            all_up(),
            BackendStatus::Ready,
        );
        assert_eq!(prompt, "ai:✓ alice@box:~ (main) {prod/web} $ ");
    }

    #[test]
    fn dead_children_show_in_the_glyphs() {
        let health = Health {
            sandbox: false,
            proxy: true,
            backend: false,
        };
        let prompt = render(
            "alice",
            "box",
            Path::new("/"),
            None,
            &PromptContext::default(),
            health,
            BackendStatus::Unreachable,
        );
        assert!(prompt.starts_with("ai:✗ sb:✗ "));
    }

    #[test]
    fn branch_read_from_git_head() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/feature/x\n").unwrap();

        let nested = dir.path().join("deep/inside");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(read_git_branch(&nested), Some("feature/x".to_owned()));
    }

    #[test]
    fn detached_head_shows_a_short_hash() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(git.join("HEAD"), "0123456789abcdef0123456789abcdef01234567\n")
            .unwrap();
        assert_eq!(read_git_branch(dir.path()), Some("01234567".to_owned()));
    }

    #[test]
    fn kube_context_and_namespace_parse() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config");
        std::fs::write(
            &config,
            "current-context: prod\n\
             contexts:\n\
             - name: prod\n\
             \x20 context:\n\
             \x20   cluster: main\n\
             \x20   namespace: web\n\
             - name: dev\n\
             \x20 context:\n\
             \x20   cluster: other\n",
        )
        .unwrap();
        assert_eq!(
            read_kube_context(&config),
            (Some("prod".to_owned()), Some("web".to_owned()))
        );
    }

    #[test]
    fn missing_kube_config_is_quietly_empty() {
        assert_eq!(
            read_kube_context(Path::new("/nonexistent/kube/config")),
            (None, None)
        );
    }
}
