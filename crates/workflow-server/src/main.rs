//! Approval workflow command line
//!
//! Every subcommand prints an `ApiResponse` as JSON and exits non-zero on errors.

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use workflow_core::{
    ApiResponse, DefinitionRegistry, FileRepository, InMemoryRepository, NewWorkItem,
    StaticIdentityProvider, StorageBackend, WorkItemRepository, WorkflowApi, WorkflowConfig,
    WorkflowOrchestrator,
};
use workflow_types::{ActorId, ApprovalAction, StepId, WorkItemId, WorkflowType};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_command().get_matches();
    let config = load_config(&matches)?;
    let api = build_api(&config)?;

    let (output, ok) = execute(&api, &matches).await?;
    println!("{}", output);

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn actor_arg() -> Arg {
    Arg::new("actor")
        .long("actor")
        .short('a')
        .value_name("ACTOR")
        .help("Acting user id")
        .required(true)
}

fn item_arg() -> Arg {
    Arg::new("item")
        .value_name("ITEM_ID")
        .help("Work item id")
        .required(true)
}

fn decision_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(item_arg())
        .arg(
            Arg::new("step")
                .long("step")
                .short('s')
                .value_name("STEP_ID")
                .help("Step the decision applies to")
                .required(true),
        )
        .arg(actor_arg())
        .arg(
            Arg::new("reason")
                .long("reason")
                .short('r')
                .value_name("TEXT")
                .help("Reason for the decision"),
        )
}

fn build_command() -> Command {
    Command::new("workflow-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Approval workflow for work orders and service center requests")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path (JSON)")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for work item files, overrides the config")
                .global(true),
        )
        .subcommand(
            Command::new("create")
                .about("Register a new work item in draft")
                .arg(
                    Arg::new("type")
                        .long("type")
                        .short('t')
                        .value_name("TYPE")
                        .help("Workflow type")
                        .value_parser(WorkflowType::ALL.map(|kind| kind.as_str()))
                        .default_value("work_order"),
                )
                .arg(
                    Arg::new("title")
                        .long("title")
                        .value_name("TEXT")
                        .required(true),
                )
                .arg(Arg::new("description").long("description").value_name("TEXT"))
                .arg(
                    Arg::new("id")
                        .long("id")
                        .value_name("ITEM_ID")
                        .help("Explicit item id, generated when omitted"),
                )
                .arg(Arg::new("assign").long("assign").value_name("ACTOR"))
                .arg(actor_arg()),
        )
        .subcommand(
            Command::new("start")
                .about("Start the approval workflow for an item")
                .arg(item_arg())
                .arg(actor_arg()),
        )
        .subcommand(decision_command("approve", "Approve the current step"))
        .subcommand(decision_command("reject", "Reject the current step"))
        .subcommand(
            Command::new("pending")
                .about("List items awaiting a decision from an actor")
                .arg(actor_arg()),
        )
        .subcommand(Command::new("show").about("Show one work item").arg(item_arg()))
        .subcommand(Command::new("definitions").about("List workflow definitions"))
        .subcommand(
            Command::new("stats")
                .about("Count work items per status")
                .arg(
                    Arg::new("open-only")
                        .long("open-only")
                        .help("Only print the number of open items")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<WorkflowConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let config = WorkflowConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?;
            log::info!("Loaded configuration from {}", path);
            config
        }
        None => WorkflowConfig::default(),
    };

    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.storage.data_dir = PathBuf::from(data_dir);
    }
    config.validate()?;

    Ok(config)
}

fn build_api(config: &WorkflowConfig) -> anyhow::Result<WorkflowApi> {
    let mut registry = DefinitionRegistry::with_builtin()?;
    if let Some(path) = &config.definitions_file {
        registry
            .load_file(path)
            .with_context(|| format!("Failed to load definitions from {}", path.display()))?;
    }

    let repository: Arc<dyn WorkItemRepository> = match config.storage.backend {
        StorageBackend::File => {
            let repository = FileRepository::new(&config.storage.data_dir).with_context(|| {
                format!(
                    "Failed to initialize storage at {}",
                    config.storage.data_dir.display()
                )
            })?;
            log::info!("Using data directory: {}", config.storage.data_dir.display());
            Arc::new(repository)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage, items are lost on exit");
            Arc::new(InMemoryRepository::new())
        }
    };

    let identity = StaticIdentityProvider::from_config(config);
    log::debug!("Configured {} actors", identity.len());

    Ok(WorkflowApi::new(WorkflowOrchestrator::new(
        Arc::new(registry),
        repository,
        Arc::new(identity),
    )))
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> anyhow::Result<(String, bool)> {
    Ok((serde_json::to_string_pretty(response)?, response.is_ok()))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("Missing argument: {}", name))
}

/// Run the selected subcommand, returning the JSON output and whether it succeeded
async fn execute(api: &WorkflowApi, matches: &ArgMatches) -> anyhow::Result<(String, bool)> {
    match matches.subcommand() {
        Some(("create", sub)) => {
            let workflow_type: WorkflowType = required(sub, "type")?.parse()?;
            let mut new_item = NewWorkItem::new(
                required(sub, "title")?.as_str(),
                workflow_type,
                ActorId::from(required(sub, "actor")?.as_str()),
            );
            if let Some(id) = sub.get_one::<String>("id") {
                new_item = new_item.with_id(WorkItemId::from(id.as_str()));
            }
            if let Some(description) = sub.get_one::<String>("description") {
                new_item.description = description.clone();
            }
            new_item.assigned_to = sub.get_one::<String>("assign").map(|a| ActorId::from(a.as_str()));

            render(&api.create_item(new_item).await)
        }
        Some(("start", sub)) => {
            let actor = ActorId::from(required(sub, "actor")?.as_str());
            let item = WorkItemId::from(required(sub, "item")?.as_str());
            render(&api.start_workflow(&actor, &item).await)
        }
        Some((name @ ("approve" | "reject"), sub)) => {
            let action = if name == "approve" {
                ApprovalAction::Approve
            } else {
                ApprovalAction::Reject
            };
            let actor = ActorId::from(required(sub, "actor")?.as_str());
            let item = WorkItemId::from(required(sub, "item")?.as_str());
            let step = StepId::from(required(sub, "step")?.as_str());
            let reason = sub.get_one::<String>("reason").cloned();

            render(&api.submit_approval(&actor, &item, &step, action, reason).await)
        }
        Some(("pending", sub)) => {
            let actor = ActorId::from(required(sub, "actor")?.as_str());
            render(&api.list_pending_approvals(&actor).await)
        }
        Some(("show", sub)) => {
            let item = WorkItemId::from(required(sub, "item")?.as_str());
            render(&api.get_item(&item).await)
        }
        Some(("definitions", _)) => render(&api.list_definitions()),
        Some(("stats", sub)) => {
            let stats = api.stats().await;
            if !sub.get_flag("open-only") {
                return render(&stats);
            }
            match stats {
                ApiResponse::Ok(counts) => render(&ApiResponse::Ok(counts.open())),
                ApiResponse::Error(e) => render(&ApiResponse::<usize>::Error(e)),
            }
        }
        _ => anyhow::bail!("Unknown command"),
    }
}
