use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use dynent_sdk::{Engine, EngineConfig, FetchPlan, Model, TypeBinding};
use serde_json::{json, Value as Json};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Check(args) => cmd_check(args, config, &cli.format),
        Command::Plan(args) => cmd_plan(args, config, &cli.format),
        Command::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("reading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_engine(
    model: &Path,
    config: EngineConfig,
) -> anyhow::Result<(Engine, Model, Vec<Arc<TypeBinding>>)> {
    let model = Model::load(model).with_context(|| format!("loading model {}", model.display()))?;
    let engine = Engine::with_config(config);
    let bindings = engine.load_model(&model)?;
    Ok((engine, model, bindings))
}

fn cmd_check(args: CheckArgs, config: EngineConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let (_engine, model, bindings) = load_engine(&args.model, config)?;
    let partial = bindings.iter().filter(|b| !b.is_complete()).count();

    match format {
        OutputFormat::Json => {
            let report = json!({
                "types": model.types.iter().map(|t| json!({
                    "name": t.type_name,
                    "attributes": t.attributes.len(),
                    "backing_schema": t.backing_schema,
                })).collect::<Vec<_>>(),
                "schemas": model.schemas.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
                "bindings": bindings.iter().map(|b| binding_json(b)).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Model {}: {} types, {} schemas",
                "✓".green().bold(),
                args.model.display().to_string().bold(),
                model.types.len(),
                model.schemas.len()
            );
            for descriptor in &model.types {
                if descriptor.backing_schema.is_none() {
                    println!("  {} {}", descriptor.type_name.yellow(), "(not backed)".dimmed());
                }
            }
            for binding in &bindings {
                print_binding(binding);
            }
        }
    }

    if args.strict && partial > 0 {
        bail!("{partial} partial binding(s)");
    }
    Ok(())
}

fn print_binding(binding: &TypeBinding) {
    let entity_type = binding.entity_type();
    let status = if binding.is_complete() {
        "complete".green()
    } else {
        "partial".red()
    };
    println!(
        "  {} -> {} [{}]",
        entity_type.name().yellow(),
        binding.schema().name.cyan(),
        status
    );
    for attribute in entity_type.attributes() {
        match binding.path(attribute.slot) {
            Some(path) => println!("    {:<16} {}", attribute.name, path.to_string().dimmed()),
            None => println!("    {:<16} {}", attribute.name, "unmapped".red()),
        }
    }
}

fn binding_json(binding: &TypeBinding) -> Json {
    let entity_type = binding.entity_type();
    let paths = entity_type
        .attributes()
        .filter_map(|a| binding.path(a.slot).map(|p| (a.name.clone(), Json::String(p.to_string()))))
        .collect::<serde_json::Map<_, _>>();
    json!({
        "type": entity_type.name(),
        "schema": binding.schema().name,
        "complete": binding.is_complete(),
        "paths": paths,
        "unmapped": binding.unmapped(),
    })
}

fn cmd_plan(args: PlanArgs, mut config: EngineConfig, format: &OutputFormat) -> anyhow::Result<()> {
    if args.no_auto_keys {
        config.fetch.auto_add_keys = false;
    }
    let (engine, _model, _bindings) = load_engine(&args.model, config)?;
    let attributes: Vec<&str> = args.attributes.iter().map(String::as_str).collect();
    let plan = engine.plan(&args.type_name, &attributes)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?),
        OutputFormat::Text => {
            println!(
                "{} Plan over {} ({} items)",
                "✓".green().bold(),
                args.type_name.yellow().bold(),
                plan.len()
            );
            print_plan(&plan, 1);
        }
    }
    Ok(())
}

fn print_plan(plan: &FetchPlan, depth: usize) {
    let indent = "  ".repeat(depth);
    for item in plan.items() {
        let marker = if item.is_auto_added() { " (auto)".dimmed() } else { "".normal() };
        match item.nested() {
            Some(nested) => {
                let target = nested.entity_type().map(|t| t.name()).unwrap_or("?");
                println!("{indent}{} -> {}{marker}", item.name(), target.cyan());
                print_plan(nested, depth + 1);
            }
            None => println!("{indent}{}{marker}", item.name()),
        }
    }
}

fn plan_json(plan: &FetchPlan) -> Json {
    let items = plan
        .items()
        .map(|item| {
            let mut entry = json!({
                "name": item.name(),
                "slot": item.slot(),
                "auto_added": item.is_auto_added(),
            });
            if let Some(nested) = item.nested() {
                entry["nested"] = plan_json(nested);
            }
            entry
        })
        .collect::<Vec<_>>();
    json!({
        "type": plan.entity_type().map(|t| t.name()),
        "items": items,
    })
}

fn cmd_config(config: &EngineConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
