use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dynent",
    about = "Dynamic entity engine: inspect models and fetch plans",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a model file and report attribute bindings
    Check(CheckArgs),
    /// Build and print the fetch plan for a type
    Plan(PlanArgs),
    /// Print the effective engine configuration
    Config,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Model file (TOML, or JSON with a .json extension)
    pub model: PathBuf,
    /// Fail when any binding is partial
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    pub model: PathBuf,
    /// Entity type the plan targets
    pub type_name: String,
    /// Attributes to include; dotted paths follow references
    pub attributes: Vec<String>,
    /// Do not add key and version attributes
    #[arg(long)]
    pub no_auto_keys: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["dynent", "check", "model.toml"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert_eq!(args.model, PathBuf::from("model.toml"));
            assert!(!args.strict);
        } else { panic!("wrong command"); }
        assert!(matches!(cli.format, OutputFormat::Text));
    }

    #[test]
    fn parse_check_strict_json() {
        let cli = Cli::try_parse_from(["dynent", "check", "m.json", "--strict", "--format", "json"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        if let Command::Check(args) = cli.command {
            assert!(args.strict);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_plan() {
        let cli = Cli::try_parse_from(["dynent", "plan", "m.toml", "Person", "name", "manager.name"]).unwrap();
        if let Command::Plan(args) = cli.command {
            assert_eq!(args.type_name, "Person");
            assert_eq!(args.attributes, vec!["name", "manager.name"]);
            assert!(!args.no_auto_keys);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_plan_without_auto_keys() {
        let cli = Cli::try_parse_from(["dynent", "plan", "--no-auto-keys", "m.toml", "Person"]).unwrap();
        if let Command::Plan(args) = cli.command {
            assert!(args.no_auto_keys);
            assert!(args.attributes.is_empty());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_plan_requires_type() {
        assert!(Cli::try_parse_from(["dynent", "plan", "m.toml"]).is_err());
    }

    #[test]
    fn parse_config_with_globals() {
        let cli = Cli::try_parse_from(["dynent", "config", "-v", "--config", "engine.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
    }

    #[test]
    fn parse_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["dynent", "config", "--format", "yaml"]).is_err());
    }
}
