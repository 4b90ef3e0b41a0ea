//! `codegate init` — scaffold a new gateway project in the current
//! directory: a `config.toml`, the state directory, and a workspace
//! directory the builtin `fs.*`/`exec.run` tools are sandboxed to.

use std::path::Path;

/// Scaffold a new codegate project in the current directory.
///
/// `use_defaults` skips the interactive port prompt and uses 3210.
pub fn init(use_defaults: bool) -> anyhow::Result<()> {
    init_in(Path::new("."), use_defaults)
}

fn init_in(base: &Path, use_defaults: bool) -> anyhow::Result<()> {
    let config_path = base.join("config.toml");

    if config_path.exists() {
        anyhow::bail!(
            "config.toml already exists. Use a different directory or remove it first."
        );
    }

    let port: u16 = if use_defaults { 3210 } else { prompt_port() };

    std::fs::write(&config_path, render_config(port))?;
    std::fs::create_dir_all(base.join("workspace"))?;
    std::fs::create_dir_all(base.join("data"))?;

    eprintln!();
    eprintln!("  codegate project initialized!");
    eprintln!();
    eprintln!("  Created:");
    eprintln!("    config.toml   - gateway configuration");
    eprintln!("    workspace/    - sandbox root for builtin fs/exec tools");
    eprintln!("    data/         - persistent state storage");
    eprintln!();
    eprintln!("  Next steps:");
    eprintln!("    1. Run `codegate doctor` to verify the setup");
    eprintln!("    2. Run `codegate` to start the gateway");
    eprintln!();

    Ok(())
}

fn prompt_port() -> u16 {
    eprint!("  Port to listen on [3210]: ");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).unwrap_or_default();
    input.trim().parse().unwrap_or(3210)
}

fn render_config(port: u16) -> String {
    format!(
        r#"# codegate configuration
# See SPEC_FULL.md for the full set of options.

[server]
port = {port}
host = "127.0.0.1"

[runtime]
default_adapter = "local_inproc"

[store]
data_dir = "./data"

[tools.exec]
# Sandboxed to the workspace/ directory created alongside this file.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_config_contains_structure() {
        let output = render_config(3210);
        assert!(output.contains("[server]"));
        assert!(output.contains("port = 3210"));
        assert!(output.contains("[runtime]"));
        assert!(output.contains("[store]"));
    }

    #[test]
    fn init_fails_when_config_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "existing").unwrap();

        let result = init_in(dir.path(), true);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("config.toml already exists"));
    }

    #[test]
    fn init_defaults_creates_expected_files() {
        let dir = tempfile::tempdir().unwrap();

        let result = init_in(dir.path(), true);
        assert!(result.is_ok());

        assert!(dir.path().join("config.toml").exists());
        assert!(dir.path().join("workspace").is_dir());
        assert!(dir.path().join("data").is_dir());

        let config = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(config.contains("port = 3210"));
    }
}
