//! Polystore CLI - Main entry point for CLI binary
//!
//! This binary provides the `polystore` CLI tool for compiling schemas,
//! filters and updates against a project's catalog.

use anyhow::{bail, Context, Result};
use clap::Parser;
use polystore_lib::engine::{
    adapter::{NativeModelFactory, SqlTableFactory},
    backend::UpdateStep,
    cli::{
        formatter::{describe_mapping, format_param, CliFormatter},
        Cli, Commands, OutputFormat,
    },
    config::Config,
    hybrid::{CompiledFilter, CompiledUpdate, Translator},
    model::{BackendModelDescriptor, ModelRegistry, ShadowKind},
    schema::{BackendKind, SchemaCatalog},
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name } => cmd_init(&project_dir, &name, json_output),
        Commands::Models { backend, schema } => cmd_models(&project_dir, backend, schema.as_deref(), json_output),
        Commands::Filter {
            schema,
            backend,
            query,
            native,
        } => cmd_filter(&project_dir, &schema, backend, query.as_deref(), native.as_deref(), json_output),
        Commands::Update {
            schema,
            backend,
            query,
            native,
            set,
        } => cmd_update(
            &project_dir,
            &schema,
            backend,
            query.as_deref(),
            native.as_deref(),
            &set,
            json_output,
        ),
    }
}

struct Project {
    config: Config,
    translator: Translator,
}

fn open_project(project_dir: &Path) -> Result<Project> {
    let config = Config::load(project_dir).context("Not a Polystore project (run `polystore init`)")?;
    let catalog = config
        .load_catalog(project_dir)
        .with_context(|| format!("Failed to load {}", config.catalog_path(project_dir).display()))?;
    let registry = ModelRegistry::new(catalog, config.compiler_options()).context("Failed to fingerprint the catalog")?;
    let translator = Translator::new(Arc::new(registry))
        .with_dialect(config.sql.dialect)
        .with_strategy(config.sql.embedding_strategy);
    Ok(Project { config, translator })
}

fn parse_json(label: &str, text: Option<&str>) -> Result<Option<Value>> {
    text.map(|text| serde_json::from_str(text).with_context(|| format!("--{} is not valid JSON", label)))
        .transpose()
}

fn cmd_init(project_dir: &Path, name: &str, json: bool) -> Result<()> {
    let config = Config::default_for_project(name);
    let catalog_path = config.catalog_path(project_dir);
    if project_dir.join(polystore_lib::engine::config::CONFIG_FILE).exists() {
        bail!("Project already initialized: {}", project_dir.display());
    }

    std::fs::create_dir_all(project_dir)?;
    config.save(project_dir)?;
    if !catalog_path.exists() {
        std::fs::write(&catalog_path, serde_json::to_string_pretty(&SchemaCatalog::new())?)?;
    }

    if json {
        println!(
            "{}",
            json!({
                "success": true,
                "project_dir": project_dir.display().to_string(),
                "name": name
            })
        );
    } else {
        CliFormatter::success(&format!("Created Polystore project: {}", name));
        CliFormatter::kv("Config", &project_dir.join(polystore_lib::engine::config::CONFIG_FILE).display().to_string());
        CliFormatter::kv("Schemas", &catalog_path.display().to_string());
        CliFormatter::info("Add schemas to the catalog, then run `polystore models --backend sql`");
    }
    Ok(())
}

fn cmd_models(project_dir: &Path, backend: BackendKind, schema: Option<&str>, json: bool) -> Result<()> {
    let project = open_project(project_dir)?;
    let registry = project.translator.registry();
    let models = match schema {
        Some(schema) => vec![registry.descriptor(schema, backend)?],
        None => registry.descriptors(backend)?,
    };
    let factory = (backend == BackendKind::Sql).then(|| SqlTableFactory::new(project.config.sql.dialect));

    if json {
        let mut out = Vec::new();
        for model in &models {
            let ddl = match &factory {
                Some(factory) => Some(factory.build(model)?.ddl()),
                None => None,
            };
            out.push(json!({ "model": model.as_ref(), "ddl": ddl }));
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if models.is_empty() {
        CliFormatter::warning("The catalog has no schemas");
        return Ok(());
    }
    for model in &models {
        print_model(model);
        if let Some(factory) = &factory {
            CliFormatter::code_block(&factory.build(model)?.ddl(), "sql");
        }
    }
    Ok(())
}

fn print_model(model: &BackendModelDescriptor) {
    CliFormatter::header(&format!("{} ({})", model.schema, model.backend));
    CliFormatter::kv("Container", &model.container);
    if let Some(identity) = &model.identity {
        let generated = if identity.generated { ", generated" } else { "" };
        CliFormatter::kv("Identity", &format!("{} -> {}{}", identity.accessor, identity.native, generated));
    }
    for field in &model.fields {
        CliFormatter::item(&format!("{} -> {}: {}", field.name, field.token, describe_mapping(&field.kind)));
    }
    for shadow in &model.shadow_fields {
        let role = match &shadow.kind {
            ShadowKind::Identity => continue,
            ShadowKind::ParentKey { parent } => format!("parent key of {}", parent),
            ShadowKind::ForeignKey { field, target } => format!("reference for {} to {}", field, target),
        };
        CliFormatter::item(&format!("{} (shadow): {}", shadow.token, role));
    }
    if !model.suppressed.is_empty() {
        let suppressed: Vec<&str> = model.suppressed.iter().map(String::as_str).collect();
        CliFormatter::kv("Disabled", &suppressed.join(", "));
    }
}

fn cmd_filter(
    project_dir: &Path,
    schema: &str,
    backend: BackendKind,
    query: Option<&str>,
    native: Option<&str>,
    json: bool,
) -> Result<()> {
    let project = open_project(project_dir)?;
    let query = parse_json("query", query)?;
    let compiled = project
        .translator
        .translate_filter(schema, backend, query.as_ref(), native)?;
    let dialect = project.translator.dialect();

    if json {
        let rendered = match &compiled {
            CompiledFilter::Sql(filter) => serde_json::to_value(filter.to_select(dialect))?,
            CompiledFilter::Search(query) => Value::String(query.to_string()),
            CompiledFilter::Document(filter) => filter.as_value().clone(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "compiled": compiled, "rendered": rendered }))?
        );
        return Ok(());
    }

    CliFormatter::header(&format!("{} filter on {}", backend, schema));
    match &compiled {
        CompiledFilter::Sql(filter) => {
            let statement = filter.to_select(dialect);
            let params: Vec<String> = statement.params.iter().map(format_param).collect();
            CliFormatter::statement(dialect, &statement.sql, &params);
        }
        CompiledFilter::Search(query) => CliFormatter::code_block(&query.to_string(), "text"),
        CompiledFilter::Document(filter) => {
            CliFormatter::code_block(&serde_json::to_string_pretty(filter.as_value())?, "json")
        }
    }
    Ok(())
}

fn cmd_update(
    project_dir: &Path,
    schema: &str,
    backend: BackendKind,
    query: Option<&str>,
    native: Option<&str>,
    set: &str,
    json: bool,
) -> Result<()> {
    let project = open_project(project_dir)?;
    let query = parse_json("query", query)?;
    let update = parse_json("set", Some(set))?.unwrap_or(Value::Null);
    let compiled = project
        .translator
        .translate_update(schema, backend, query.as_ref(), native, &update)?;
    let dialect = project.translator.dialect();

    if json {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
        return Ok(());
    }

    CliFormatter::header(&format!("{} update on {}", backend, schema));
    match &compiled {
        CompiledUpdate::Sql(plan) => {
            let target = plan.target_statement(dialect);
            let params: Vec<String> = target.params.iter().map(format_param).collect();
            CliFormatter::statement(dialect, &target.sql, &params);
            for (index, step) in plan.steps.iter().enumerate() {
                CliFormatter::item(&format!("{}. {}", index + 1, describe_step(step)));
            }
            if plan.requires_transaction() {
                CliFormatter::info("Run the steps in one transaction");
            }
        }
        CompiledUpdate::Search(update) => {
            CliFormatter::code_block(&update.query.to_string(), "text");
            for assignment in &update.assignments {
                CliFormatter::kv(&assignment.path, &assignment.value.to_string());
            }
        }
        CompiledUpdate::Document(update) => {
            CliFormatter::kv("Filter", &update.filter.as_value().to_string());
            CliFormatter::code_block(&serde_json::to_string_pretty(&update.update)?, "json");
        }
    }
    Ok(())
}

fn describe_step(step: &UpdateStep) -> String {
    match step {
        UpdateStep::SetColumns { table, columns, .. } => {
            format!("set {} on {}", column_names(columns), table)
        }
        UpdateStep::UpdateChildren { table, columns, .. } => {
            format!("set {} on child rows in {}", column_names(columns), table)
        }
        UpdateStep::DeleteChildren { table, .. } => format!("delete child rows in {}", table),
        UpdateStep::InsertChildren { table, rows, .. } => format!("insert {} row(s) per parent into {}", rows.len(), table),
    }
}

fn column_names(columns: &[(String, Value)]) -> String {
    columns.iter().map(|(column, _)| column.as_str()).collect::<Vec<_>>().join(", ")
}
