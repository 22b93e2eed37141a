//! Project discovery and scaffolding.
//!
//! A directory containing `.orc/` marks a project root. Inside it:
//! `config.yaml` (shared config), `shared/` (team overrides), `local/`
//! (per-user overrides), `worktrees/` (managed checkouts), `orc.db`
//! (the store), and `constitution.md` (text injected into every phase
//! prompt).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const ORC_DIR: &str = ".orc";

const DEFAULT_CONFIG: &str = "\
# orc project configuration (shared layer)
# target_branch: main
# branch_prefix: orc
# worktree:
#   enabled: true
# gates:
#   default_type: auto
# automation:
#   triggers: []
";

const DEFAULT_CONSTITUTION: &str = "\
# Project constitution

Rules every agent must follow on this repository. Edit freely; the text
is injected into every phase prompt.
";

/// Walk ancestors of `start` looking for a `.orc/` directory.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(ORC_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// The store file inside a project.
pub fn store_path(root: &Path) -> PathBuf {
    root.join(ORC_DIR).join("orc.db")
}

/// Constitution text, when the project carries one.
pub fn load_constitution(root: &Path) -> Option<String> {
    let text = std::fs::read_to_string(root.join(ORC_DIR).join("constitution.md")).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Scaffold `.orc/` in `dir`. Refuses to overwrite an existing project
/// unless `force` is set.
pub fn init_project(dir: &Path, force: bool) -> Result<PathBuf> {
    let orc = dir.join(ORC_DIR);
    if orc.exists() && !force {
        bail!("project already initialised at {}", orc.display());
    }

    for sub in ["shared", "local", "worktrees", "logs"] {
        std::fs::create_dir_all(orc.join(sub))
            .with_context(|| format!("failed to create {}", orc.join(sub).display()))?;
    }

    let config = orc.join("config.yaml");
    if !config.exists() || force {
        std::fs::write(&config, DEFAULT_CONFIG).context("failed to write config.yaml")?;
    }
    let constitution = orc.join("constitution.md");
    if !constitution.exists() || force {
        std::fs::write(&constitution, DEFAULT_CONSTITUTION)
            .context("failed to write constitution.md")?;
    }

    Ok(orc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_project_root_walks_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join(ORC_DIR)).unwrap();

        let root = find_project_root(&nested).expect("root found");
        assert_eq!(root, dir.path());
        // Symmetric: no marker, no root
        let bare = tempfile::tempdir().unwrap();
        assert!(find_project_root(bare.path()).is_none());
    }

    #[test]
    fn test_init_is_guarded_and_idempotent_with_force() {
        let dir = tempfile::tempdir().unwrap();
        let orc = init_project(dir.path(), false).unwrap();
        assert!(orc.join("config.yaml").is_file());
        assert!(orc.join("worktrees").is_dir());
        assert!(orc.join("constitution.md").is_file());

        assert!(init_project(dir.path(), false).is_err());
        assert!(init_project(dir.path(), true).is_ok());
    }

    #[test]
    fn test_constitution_loading() {
        let dir = tempfile::tempdir().unwrap();
        init_project(dir.path(), false).unwrap();
        // The stub counts as content
        assert!(load_constitution(dir.path()).is_some());

        std::fs::write(dir.path().join(".orc/constitution.md"), "  \n").unwrap();
        assert!(load_constitution(dir.path()).is_none());
    }
}
