use cg_domain::config::{Config, ConfigSeverity, RuntimeKind};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("codegate doctor");
    println!("===============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_store_dir(config, &mut all_passed);
    check_runtime_adapters(config, &mut all_passed);
    check_mcp_servers(config).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_store_dir(config: &Config, all_passed: &mut bool) {
    let path = std::path::Path::new(&config.store.data_dir);
    let writable = std::fs::create_dir_all(path).is_ok() && {
        let probe = path.join(".codegate_doctor_probe");
        let w = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        w
    };

    print_check(
        "State directory writable",
        writable,
        if writable {
            format!("{}", path.display())
        } else {
            format!("{} (not writable)", path.display())
        },
    );
    if !writable {
        *all_passed = false;
    }
}

fn check_runtime_adapters(config: &Config, all_passed: &mut bool) {
    let default = config.runtime.default_adapter;
    let default_ok = match default {
        RuntimeKind::LocalInproc => true,
        RuntimeKind::Subprocess => config.runtime.subprocess.host_binary.is_some(),
        RuntimeKind::RemoteWorker => config.runtime.remote_worker.worker_url.is_some(),
    };
    print_check(
        "Default runtime adapter available",
        default_ok,
        format!("{default} ({})", if default_ok { "ready" } else { "not configured" }),
    );
    if !default_ok {
        *all_passed = false;
    }
}

async fn check_mcp_servers(config: &Config) {
    if config.mcp.servers.is_empty() {
        print_check("MCP servers", true, "none configured".into());
        return;
    }
    let manager = cg_mcp_client::McpManager::from_config(&config.mcp).await;
    print_check(
        "MCP servers",
        manager.server_count() == config.mcp.servers.len(),
        format!(
            "{}/{} initialized, {} tool(s) discovered",
            manager.server_count(),
            config.mcp.servers.len(),
            manager.tool_count()
        ),
    );
    manager.shutdown().await;
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
