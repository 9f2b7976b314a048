use anyhow::Result;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Validate => validate(ctx),
        ConfigCommand::Path => {
            println!("{}", ctx.source.describe());
            Ok(())
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    if !ctx.quiet {
        println!("# source: {}", ctx.source.describe());
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn validate(ctx: &Context) -> Result<()> {
    ui::header("Validating configuration");
    ui::kv("Source", &ctx.source.describe());

    let credentials = ctx.config.credentials_root();
    ui::kv("Credentials", &credentials.display().to_string());
    if !credentials.join("config").is_dir() {
        ui::warn(&format!(
            "{} has no config/ directory; credential distribution will fail",
            credentials.display()
        ));
    }

    let problems = ctx.config.validate();
    println!();
    if problems.is_empty() {
        ui::success("Configuration is valid");
        return Ok(());
    }

    for problem in &problems {
        ui::error(problem);
    }
    anyhow::bail!("{} configuration problem(s) found", problems.len())
}
