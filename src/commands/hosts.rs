use anyhow::Result;
use colored::Colorize;
use reconcile::{EnvironmentKind, Operation};
use serde_json::json;

use crate::Context;
use crate::ui;

/// Operations that may target `role`, default-role ones first
fn operations_for(role: &str) -> Vec<&'static str> {
    let mut ops: Vec<Operation> = Operation::ALL
        .into_iter()
        .filter(|op| op.roles().contains(&role))
        .collect();
    ops.sort_by_key(|op| op.default_role() != role);
    ops.into_iter().map(|op| op.name()).collect()
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let config = &ctx.config;

    if json {
        let roles: serde_json::Map<_, _> = config
            .roles
            .iter()
            .map(|(role, hosts)| {
                (
                    role.clone(),
                    json!({ "hosts": hosts, "operations": operations_for(role) }),
                )
            })
            .collect();
        let environments: Vec<_> = EnvironmentKind::ALL
            .iter()
            .map(|kind| {
                json!({
                    "name": kind.name(),
                    "branch": kind.branch(),
                    "credentials": kind.credential_folder(),
                })
            })
            .collect();
        let out = json!({ "roles": roles, "environments": environments });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    ui::header("Roles");
    for (role, hosts) in &config.roles {
        ui::section(role);
        for host in hosts {
            println!("  {} {}", "•".dimmed(), host);
        }
        let ops = operations_for(role);
        if !ops.is_empty() {
            ui::dim(&format!("operations: {}", ops.join(", ")));
        }
    }

    ui::header("Environments");
    for kind in EnvironmentKind::ALL {
        ui::kv(
            kind.name(),
            &format!(
                "branch {}, credentials config/{}",
                kind.branch().bold(),
                kind.credential_folder()
            ),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_for_web_lists_default_role_first() {
        let ops = operations_for("web");
        assert_eq!(ops.first(), Some(&"deploy"));
        assert!(ops.contains(&"setup_db"));
        let setup_db = ops.iter().position(|o| *o == "setup_db").unwrap();
        let restart = ops.iter().position(|o| *o == "restart").unwrap();
        assert!(restart < setup_db);
    }

    #[test]
    fn test_unknown_role_has_no_operations() {
        assert!(operations_for("cache").is_empty());
    }
}
