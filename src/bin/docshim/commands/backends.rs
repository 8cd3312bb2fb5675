//! `docshim backends` command
//!
//! Show interpreters, format routes, and optionally live capabilities.

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::BackendsArgs;
use docshim::util::process::{find_executable, find_python, find_ruby, interpreter_version};
use docshim::{BackendId, Config, Registry};

pub fn execute(args: BackendsArgs, config: &Config) -> Result<()> {
    println!("Interpreters:");
    println!();

    for id in BackendId::all() {
        match interpreter_for(id, config) {
            Some(path) => {
                let version = interpreter_version(&path)
                    .unwrap_or_else(|e| format!("unknown version ({:#})", e));
                println!("  {:<8} {}", id, path.display());
                println!("           {}", version);
            }
            None if id == BackendId::Script && config.sidecar.script.is_none() => {
                println!("  {:<8} not configured", id);
            }
            None => println!("  {:<8} not found", id),
        }
    }

    println!();
    println!("Routes:");
    println!();

    let registry = Registry::with_default_backends(config);
    for server in registry.servers() {
        let formats: Vec<String> = registry
            .formats_of(&server)
            .iter()
            .map(|f| f.to_string())
            .collect();
        println!("  {} -> {}", formats.join(", "), server.name());

        if args.probe {
            for format in registry.formats_of(&server) {
                match server.supports_conversion(&format) {
                    Ok(()) => println!("    {:<12} supported", format),
                    Err(e) => println!("    {:<12} unavailable: {}", format, e),
                }
            }
        }
    }
    registry.cleanup();

    Ok(())
}

fn interpreter_for(id: BackendId, config: &Config) -> Option<PathBuf> {
    let configured = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|p| find_executable(&p.to_string_lossy()))
    };

    match id {
        BackendId::Python => configured(&config.sidecar.python).unwrap_or_else(find_python),
        BackendId::Ruby => configured(&config.sidecar.ruby).unwrap_or_else(find_ruby),
        BackendId::Script => config
            .sidecar
            .script
            .as_ref()
            .and_then(|s| find_executable(&s.interpreter.to_string_lossy())),
    }
}
