//! `infraflow` command-line front end.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use infraflow::config::{resolve, AppContext, EnvironmentConfig, DEFAULT_CONTEXT_FILE};
use infraflow::iam::{ExecutionRole, ASSUME_ROLE_ACTION, DEFAULT_PARTITION};
use infraflow::observability::init_tracing;
use infraflow::pipeline::{synthesize_in_partition, Action, PipelineStack};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "infraflow")]
#[command(about = "Synthesize and inspect the infrastructure CI pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Context document (cdk.json style). Defaults to ./cdk.json when present.
    #[arg(long, global = true, env = "INFRAFLOW_CONTEXT_FILE", value_name = "PATH")]
    context_file: Option<PathBuf>,

    /// Context override, e.g. `-c env=dev`. Repeatable; overrides win.
    #[arg(short = 'c', long = "context", global = true, value_name = "KEY=VALUE")]
    context: Vec<String>,

    /// Partition used in role ARNs.
    #[arg(long, global = true, default_value = DEFAULT_PARTITION)]
    partition: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resource template for the selected environment
    Synth,
    /// Summarize the stack, pipeline stages and watched source
    Describe,
    /// Check whether the execution role may assume a role
    CheckAssume {
        /// ARN of the role to assume
        role_arn: String,
    },
    /// Print the ordered teardown steps
    TeardownPlan,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs).context("Failed to initialize logging")?;

    match &cli.command {
        Commands::CheckAssume { role_arn } => check_assume(&cli.partition, role_arn),
        Commands::Synth => {
            let stack = load_stack(&cli)?;
            print_json(&stack.to_template())
        }
        Commands::Describe => {
            let stack = load_stack(&cli)?;
            print_json(&describe(&stack))
        }
        Commands::TeardownPlan => {
            let stack = load_stack(&cli)?;
            print_json(&json!({
                "stack": stack.stack_id(),
                "steps": stack.teardown_plan(),
            }))
        }
    }
}

fn load_context(file: Option<&Path>, overrides: &[String]) -> Result<AppContext> {
    let mut ctx = match file {
        Some(path) => AppContext::from_file(path)
            .with_context(|| format!("Failed to load context from {}", path.display()))?,
        None if Path::new(DEFAULT_CONTEXT_FILE).exists() => AppContext::from_file(DEFAULT_CONTEXT_FILE)
            .with_context(|| format!("Failed to load context from {DEFAULT_CONTEXT_FILE}"))?,
        None => AppContext::new(),
    };
    for pair in overrides {
        ctx.apply_override(pair)?;
    }
    tracing::debug!(values = ctx.len(), overrides = overrides.len(), "Loaded application context");
    Ok(ctx)
}

fn load_config(cli: &Cli) -> Result<EnvironmentConfig> {
    let ctx = load_context(cli.context_file.as_deref(), &cli.context)?;
    Ok(resolve(&ctx)?)
}

fn load_stack(cli: &Cli) -> Result<PipelineStack> {
    let config = load_config(cli)?;
    Ok(synthesize_in_partition(&config, &cli.partition)?)
}

fn describe(stack: &PipelineStack) -> Value {
    let pipeline = stack.pipeline();
    let stages: Vec<Value> = pipeline
        .stages()
        .iter()
        .map(|stage| {
            let actions: Vec<Value> = stage
                .actions
                .iter()
                .map(|action| match action {
                    Action::Source(source) => json!({
                        "name": source.name,
                        "category": action.category(),
                        "watches": source.watched(),
                        "output": source.output,
                    }),
                    Action::Build(build) => json!({
                        "name": build.name,
                        "category": action.category(),
                        "project": build.project.logical_id,
                        "input": build.input,
                    }),
                })
                .collect();
            json!({"name": stage.name, "actions": actions})
        })
        .collect();

    json!({
        "stack": stack.stack_id(),
        "description": stack.description(),
        "pipeline": pipeline.name(),
        "artifactBucket": stack.artifact_bucket().bucket_name,
        "role": stack.role().logical_id(),
        "sharedRole": pipeline.shares_one_role(),
        "stages": stages,
    })
}

fn check_assume(partition: &str, role_arn: &str) -> Result<()> {
    let role = ExecutionRole::provision(partition);
    let decision = role.evaluate(ASSUME_ROLE_ACTION, role_arn);
    print_json(&json!({
        "role": role.logical_id(),
        "action": ASSUME_ROLE_ACTION,
        "resource": role_arn,
        "decision": format!("{decision:?}"),
    }))?;

    if !decision.is_allowed() {
        bail!("{} may not assume {role_arn}", role.logical_id());
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"context": {{
                "repositoryOwner": "acme",
                "infrastructureRepoName": "infra",
                "dev": {{"envName": "dev", "infrastructureBranchName": "main"}},
                "prod": {{"envName": "prod", "infrastructureBranchName": "release"}}
            }}}}"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_cli_parses_global_context() {
        let cli = Cli::try_parse_from(["infraflow", "describe", "-c", "env=dev", "--context", "x=1"]).unwrap();
        assert_eq!(cli.context, vec!["env=dev", "x=1"]);
        assert_eq!(cli.partition, "aws");
        assert!(matches!(cli.command, Commands::Describe));
    }

    #[test]
    fn test_overrides_select_environment() {
        let file = context_file();
        let ctx = load_context(Some(file.path()), &["env=prod".to_string()]).unwrap();
        let config = resolve(&ctx).unwrap();

        assert_eq!(config.env_name, "prod");
        assert_eq!(config.infrastructure_branch_name, "release");
    }

    #[test]
    fn test_missing_selector_is_an_error() {
        let file = context_file();
        let ctx = load_context(Some(file.path()), &[]).unwrap();
        assert!(resolve(&ctx).is_err());
    }

    #[test]
    fn test_describe_lists_stages() {
        let file = context_file();
        let ctx = load_context(Some(file.path()), &["env=dev".to_string()]).unwrap();
        let stack = synthesize_in_partition(&resolve(&ctx).unwrap(), DEFAULT_PARTITION).unwrap();
        let summary = describe(&stack);

        assert_eq!(summary["pipeline"], "dev-CI-Pipeline");
        assert_eq!(summary["stages"][0]["actions"][0]["watches"], "acme/infra@main");
        assert_eq!(summary["stages"][1]["actions"][0]["input"], "InfrastructureSourceOutput");
        assert_eq!(summary["sharedRole"], true);
    }

    #[test]
    fn test_check_assume() {
        assert!(check_assume("aws", "arn:aws:iam::123456789012:role/cdk-hnb659fds-deploy-role").is_ok());
        assert!(check_assume("aws", "arn:aws:iam::123456789012:role/admin").is_err());
    }
}
