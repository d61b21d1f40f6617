use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nexus_infra_core::{BuildContext, BuildError, BuildInputs, Config, NodeId, SecretValue};
use nexus_infra_graph::{AppGraph, EdgeGraph, ResourceGraph};
use nexus_infra_policy::{AlarmGroup, BudgetPolicy, Synthesis, SynthError};

const DEFAULT_CONFIG_FILE: &str = "nexus-infra.toml";

/// Nexus infrastructure - stage-parameterized resource graphs for the Nexus web application
#[derive(Parser)]
#[command(name = "nexus-infra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: nexus-infra.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build both graphs and all policy objects for a stage
    Synth {
        /// Stage to build (dev, staging, prod)
        #[arg(short, long, env = "STAGE")]
        stage: Option<String>,

        /// Output file for the synthesis document
        #[arg(short, long, default_value = "synth.json")]
        output: PathBuf,

        /// Also output markdown summary
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// Print both graphs in dependency order
    Graph {
        #[arg(short, long, env = "STAGE")]
        stage: Option<String>,
    },

    /// Show resources that depend on a node
    Impact {
        /// Node id, with or without the stage suffix
        node: String,

        #[arg(short, long, env = "STAGE")]
        stage: Option<String>,
    },

    /// List the alarm catalogue for a stage
    Alarms {
        #[arg(short, long, env = "STAGE")]
        stage: Option<String>,
    },

    /// Show the monthly budget
    Budget,
}

fn main() {
    // .env must be loaded before clap reads STAGE
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        match build_error(&err) {
            Some(build) => eprintln!("{} [{}] {}", "Error:".red().bold(), build.code(), build),
            None => eprintln!("{} {:#}", "Error:".red().bold(), err),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn build_error(err: &anyhow::Error) -> Option<&BuildError> {
    err.downcast_ref::<BuildError>().or_else(|| match err.downcast_ref::<SynthError>() {
        Some(SynthError::Build(build)) => Some(build),
        _ => None,
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Synth { stage, output, markdown } => {
            synth_command(config, stage, &output, markdown.as_deref())
        }
        Commands::Graph { stage } => graph_command(config, stage),
        Commands::Impact { node, stage } => impact_command(config, stage, &node),
        Commands::Alarms { stage } => alarms_command(config, stage),
        Commands::Budget => {
            budget_command(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = if let Some(config_path) = path {
        Config::from_file(config_path)?
    } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG_FILE))?
    } else {
        tracing::debug!("no config file found, using defaults");
        Config::default()
    };

    tracing::debug!(topology = %config.topology, region = %config.region, "loaded config");

    Ok(config)
}

/// Gather stage and secret, then validate them in that order
fn resolve_context(config: Config, stage: Option<String>) -> Result<BuildContext> {
    let secret = std::env::var(&config.secret_env).ok().map(SecretValue::new);
    let ctx = BuildContext::resolve(config, BuildInputs { stage, secret })?;
    Ok(ctx)
}

fn synth_command(
    config: Config,
    stage: Option<String>,
    output: &Path,
    markdown: Option<&Path>,
) -> Result<()> {
    let ctx = resolve_context(config, stage)?;

    tracing::debug!(stage = %ctx.stage.stage, topology = %ctx.topology(), "synthesizing");

    let synthesis = Synthesis::synthesize(&ctx)?;
    let written = if ctx.config.redact_sensitive_data {
        synthesis.redacted()
    } else {
        synthesis
    };

    print_synth_summary(&written);

    written.save_to_file(output)?;
    eprintln!("{} {}", "Synthesis saved to:".green(), output.display());

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_summary(&written))?;
        eprintln!("{} {}", "Markdown summary saved to:".green(), md_path.display());
    }

    Ok(())
}

fn graph_command(config: Config, stage: Option<String>) -> Result<()> {
    let ctx = resolve_context(config, stage)?;

    let edge = EdgeGraph::build(&ctx)?;
    let app = AppGraph::build(&ctx, &edge.outputs)?;

    for graph in [&edge.graph, &app] {
        if !graph.is_empty() {
            print_graph(graph);
        }
    }

    Ok(())
}

fn print_graph(graph: &ResourceGraph) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} {}", graph.name.bold().bright_blue(), format!("({})", graph.region).dimmed());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    let order = graph.topological_sort().unwrap_or_default();
    for (i, node_id) in order.iter().enumerate() {
        let Some(node) = graph.get(node_id) else { continue };
        println!("  {}. {} {}", i + 1, node.id.green(), format!("[{}]", node.kind).dimmed());
        for parent in &node.references {
            println!("       {} {}", "<-".dimmed(), parent);
        }
    }
}

fn impact_command(config: Config, stage: Option<String>, node: &str) -> Result<()> {
    let ctx = resolve_context(config, stage)?;

    let edge = EdgeGraph::build(&ctx)?;
    let app = AppGraph::build(&ctx, &edge.outputs)?;

    let suffixed = ctx.name(node);
    let impacts = find_impact(&[&edge.graph, &app], &[node, suffixed.as_str()]);
    if impacts.is_empty() {
        return Err(anyhow::anyhow!(
            "Node '{}' not found in {} or {}",
            node,
            edge.graph.name,
            app.name
        ));
    }

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Downstream Impact Analysis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());

    for impact in &impacts {
        println!();
        println!("{} {}", "Node:".bold(), impact.node.green());
        println!("{} {}", "Stack:".bold(), impact.graph.name);
        println!("{} {}", "Dependent resources:".bold(), impact.downstream.len());
        println!();

        if impact.downstream.is_empty() {
            println!("{}", "✓ No dependent resources in this stack".green());
            continue;
        }

        println!("{}", "Affected resources (breadth-first):".bold());
        println!();
        for (i, id) in impact.downstream.iter().enumerate() {
            let kind = impact.graph.get(id).map(|n| n.kind.to_string()).unwrap_or_default();
            println!("  {}. {} {}", i + 1, id.yellow(), format!("[{}]", kind).dimmed());
        }
    }

    if impacts.iter().any(|i| !i.downstream.is_empty()) {
        println!();
        println!("{}", "⚠ Replacing this resource affects everything listed above!".yellow().bold());
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());

    Ok(())
}

/// Where a node lives and what depends on it there
struct Impact<'a> {
    graph: &'a ResourceGraph,
    node: NodeId,
    downstream: Vec<NodeId>,
}

/// Look a node up in every stack. Edge values imported by the application
/// graph keep their id, so one node can appear in both.
fn find_impact<'a>(graphs: &[&'a ResourceGraph], candidates: &[&str]) -> Vec<Impact<'a>> {
    graphs
        .iter()
        .filter_map(|&graph| {
            let node = candidates.iter().find(|id| graph.contains(id))?;
            Some(Impact {
                graph,
                node: node.to_string(),
                downstream: graph.downstream(node),
            })
        })
        .collect()
}

fn alarms_command(config: Config, stage: Option<String>) -> Result<()> {
    let ctx = resolve_context(config, stage)?;
    let synthesis = Synthesis::synthesize(&ctx)?;

    if synthesis.alarms.is_empty() {
        println!("{}", format!("No alarms for topology {}", synthesis.topology).yellow());
        return Ok(());
    }

    for group in [AlarmGroup::DeliveryHealth, AlarmGroup::Ingress, AlarmGroup::Table, AlarmGroup::Function] {
        let alarms: Vec<_> = synthesis.alarms.group(group).collect();
        if alarms.is_empty() {
            continue;
        }

        println!("\n{}", format!("{:?}", group).bold().bright_blue());
        for alarm in alarms {
            let page = if alarm.action.is_some() { " ⚑".red().to_string() } else { String::new() };
            println!(
                "  {} {} {} for {}/{}{}",
                alarm.name.green(),
                alarm.comparison_operator,
                alarm.threshold,
                alarm.datapoints_to_alarm,
                alarm.evaluation_periods,
                page
            );
        }
    }
    println!();

    Ok(())
}

fn budget_command(config: &Config) {
    let budget = BudgetPolicy::monthly(&config.budget);

    println!("{} {} {}/month", budget.name.bold(), budget.limit.amount, budget.limit.unit);
    for rule in &budget.notifications {
        println!(
            "  {:?} {} {}% -> {}",
            rule.notification_type,
            rule.comparison_operator,
            rule.threshold,
            rule.subscribers.iter().map(|s| s.address.as_str()).collect::<Vec<_>>().join(", ")
        );
    }
}

fn print_synth_summary(synthesis: &Synthesis) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Synthesis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Stage: {}", synthesis.stage);
    println!("Topology: {}", synthesis.topology);
    println!("Resources: {}", synthesis.node_count());
    println!("Alarms: {}", synthesis.alarms.len());
    if let Some(dashboard) = &synthesis.dashboard {
        println!("Dashboard: {} ({} widgets)", dashboard.name, dashboard.widget_count());
    }
    println!("Fingerprint: {}", synthesis.fingerprint.dimmed());

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Generate markdown summary
fn generate_markdown_summary(synthesis: &Synthesis) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Nexus Infrastructure ({})\n\n", synthesis.stage));
    md.push_str(&format!("**Version:** {}\n\n", synthesis.version));
    md.push_str(&format!("**Generated:** {}\n\n", synthesis.generated_at));
    md.push_str(&format!("**Fingerprint:** `{}`\n\n", synthesis.fingerprint));

    for graph in synthesis.edge.iter().chain(std::iter::once(&synthesis.app)) {
        md.push_str(&format!("## {}\n\n", graph.name));
        md.push_str("| Resource | Kind | Depends on |\n|---|---|---|\n");
        for node in graph.nodes() {
            md.push_str(&format!("| {} | {} | {} |\n", node.id, node.kind, node.references.join(", ")));
        }
        md.push('\n');
    }

    if !synthesis.alarms.is_empty() {
        md.push_str("## Alarms\n\n");
        md.push_str("| Alarm | Threshold | Datapoints | Action |\n|---|---|---|---|\n");
        for alarm in synthesis.alarms.alarms() {
            md.push_str(&format!(
                "| {} | {} {} | {}/{} | {} |\n",
                alarm.name,
                alarm.comparison_operator,
                alarm.threshold,
                alarm.datapoints_to_alarm,
                alarm.evaluation_periods,
                alarm.action.as_deref().unwrap_or("-"),
            ));
        }
        md.push('\n');
    }

    md.push_str("## Budget\n\n");
    md.push_str(&format!(
        "- {}: {} {} per month\n",
        synthesis.budget.name, synthesis.budget.limit.amount, synthesis.budget.limit.unit
    ));

    md
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn markdown_lists_alarms_and_budget() {
        let ctx = BuildContext::resolve(
            Config::default(),
            BuildInputs {
                stage: Some("dev".to_string()),
                secret: Some(SecretValue::new("sk_test_cli")),
            },
        )
        .unwrap();
        let synthesis = Synthesis::synthesize(&ctx).unwrap().redacted();

        let md = generate_markdown_summary(&synthesis);
        assert!(md.contains("# Nexus Infrastructure (dev)"));
        assert!(md.contains("SESBounce-dev"));
        assert!(md.contains("NexusMonthlyBudget"));
        assert!(!md.contains("sk_test_cli"));
    }

    #[test]
    fn impact_covers_edge_stack() {
        let ctx = BuildContext::resolve(
            Config::default(),
            BuildInputs {
                stage: Some("dev".to_string()),
                secret: Some(SecretValue::new("sk_test_cli")),
            },
        )
        .unwrap();
        let edge = EdgeGraph::build(&ctx).unwrap();
        let app = AppGraph::build(&ctx, &edge.outputs).unwrap();

        let suffixed = ctx.name("FirewallPolicy");
        let impacts = find_impact(&[&edge.graph, &app], &["FirewallPolicy", suffixed.as_str()]);

        let stacks: Vec<_> = impacts.iter().map(|i| i.graph.name.as_str()).collect();
        assert_eq!(stacks, vec!["WafCdkStack-dev", "NexusCdkStack-dev"]);
        assert!(impacts.iter().all(|i| i.node == "FirewallPolicy-dev"));
        assert!(impacts[0].downstream.is_empty());
        assert!(impacts[1].downstream.contains(&"Distribution-dev".to_string()));

        assert!(find_impact(&[&edge.graph, &app], &["Nope", "Nope-dev"]).is_empty());
    }

    #[test]
    fn build_errors_are_recovered_from_synth_errors() {
        let err = anyhow::Error::from(SynthError::Build(BuildError::InvalidStage("qa".to_string())));
        assert_eq!(build_error(&err), Some(&BuildError::InvalidStage("qa".to_string())));
    }
}
