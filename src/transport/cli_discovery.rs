use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Entry point shipped by the `@openai/codex` npm package.
const BUNDLED_ENTRYPOINT: &str = "node_modules/@openai/codex/bin/codex.js";

const NPX_PACKAGE: &str = "@openai/codex";

/// The program to run plus any arguments that precede `exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Resolve how to launch Codex.
///
/// Priority: explicit path, bundled npm entrypoint (searched upward from
/// `search_root` or the current directory), `codex` on PATH, then `npx` when
/// `allow_npx` is set.
pub fn resolve_base_invocation(
    codex_path: Option<&Path>,
    allow_npx: bool,
    search_root: Option<&Path>,
) -> Result<BaseInvocation> {
    resolve_with(codex_path, allow_npx, search_root, |name| which::which(name).ok())
}

/// [`resolve_base_invocation`] with the PATH lookup supplied by the caller.
fn resolve_with(
    codex_path: Option<&Path>,
    allow_npx: bool,
    search_root: Option<&Path>,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<BaseInvocation> {
    if let Some(path) = codex_path {
        return Ok(invocation_for(path, &lookup));
    }

    if let Some(entry) = find_bundled_entrypoint(search_root) {
        return Ok(node_invocation(&entry, &lookup));
    }

    if let Some(path) = lookup("codex") {
        return Ok(BaseInvocation {
            program: path,
            args: Vec::new(),
        });
    }

    if allow_npx {
        return Ok(BaseInvocation {
            program: lookup("npx").unwrap_or_else(|| PathBuf::from("npx")),
            args: vec!["-y".into(), NPX_PACKAGE.into()],
        });
    }

    Err(Error::CliNotFound(
        "codex is not on PATH; set codexPath or allowNpx".into(),
    ))
}

fn invocation_for(path: &Path, lookup: impl Fn(&str) -> Option<PathBuf>) -> BaseInvocation {
    if path.extension().is_some_and(|ext| ext == "js") {
        node_invocation(path, lookup)
    } else {
        BaseInvocation {
            program: path.to_path_buf(),
            args: Vec::new(),
        }
    }
}

fn node_invocation(script: &Path, lookup: impl Fn(&str) -> Option<PathBuf>) -> BaseInvocation {
    BaseInvocation {
        program: lookup("node").unwrap_or_else(|| PathBuf::from("node")),
        args: vec![script.to_string_lossy().into_owned()],
    }
}

fn find_bundled_entrypoint(search_root: Option<&Path>) -> Option<PathBuf> {
    let start = match search_root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    start
        .ancestors()
        .map(|dir| dir.join(BUNDLED_ENTRYPOINT))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_binary_path_wins() {
        let base = resolve_base_invocation(Some(Path::new("/opt/codex/bin/codex")), true, None)
            .unwrap();
        assert_eq!(base.program, PathBuf::from("/opt/codex/bin/codex"));
        assert!(base.args.is_empty());
    }

    #[test]
    fn explicit_js_path_runs_under_node() {
        let base = resolve_base_invocation(Some(Path::new("/lib/codex.js")), false, None).unwrap();
        assert!(base.program.ends_with("node"));
        assert_eq!(base.args, vec!["/lib/codex.js".to_string()]);
    }

    #[test]
    fn bundled_entrypoint_found_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        let entry = root.path().join(BUNDLED_ENTRYPOINT);
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&entry, "// codex").unwrap();
        let nested = root.path().join("packages/app");
        std::fs::create_dir_all(&nested).unwrap();

        let base = resolve_base_invocation(None, false, Some(&nested)).unwrap();
        assert!(base.program.ends_with("node"));
        assert_eq!(base.args, vec![entry.to_string_lossy().into_owned()]);
    }

    fn on_path(names: &'static [&'static str]) -> impl Fn(&str) -> Option<PathBuf> {
        move |name| {
            names
                .iter()
                .any(|known| *known == name)
                .then(|| PathBuf::from(format!("/usr/bin/{name}")))
        }
    }

    #[test]
    fn codex_on_path_beats_npx() {
        let empty = tempfile::tempdir().unwrap();
        let base = resolve_with(None, true, Some(empty.path()), on_path(&["codex", "npx"])).unwrap();
        assert_eq!(base.program, PathBuf::from("/usr/bin/codex"));
        assert!(base.args.is_empty());
    }

    #[test]
    fn npx_is_the_fallback_when_allowed() {
        let empty = tempfile::tempdir().unwrap();
        let base = resolve_with(None, true, Some(empty.path()), on_path(&["npx"])).unwrap();
        assert_eq!(base.program, PathBuf::from("/usr/bin/npx"));
        assert_eq!(base.args, vec!["-y".to_string(), NPX_PACKAGE.to_string()]);

        let base = resolve_with(None, true, Some(empty.path()), on_path(&[])).unwrap();
        assert_eq!(base.program, PathBuf::from("npx"));
    }

    #[test]
    fn nothing_found_without_npx_is_cli_not_found() {
        let empty = tempfile::tempdir().unwrap();
        let err = resolve_with(None, false, Some(empty.path()), on_path(&["npx"])).unwrap_err();
        assert!(matches!(err, Error::CliNotFound(_)));
    }
}
