//! CLI tool to manage cutover tables.
//!
//! Usage:
//!   cargo run --bin manage-cutover-tables -- register --name <table>
//!   cargo run --bin manage-cutover-tables -- list
//!   cargo run --bin manage-cutover-tables -- status --name <table>
//!   cargo run --bin manage-cutover-tables -- overview

use std::env;

use chrono::Utc;

use cutover_lib::config::Config;
use cutover_lib::db::DbPool;
use cutover_lib::services::CutoverEngine;

/// Actor recorded for registrations made from this tool when `--actor` is absent.
const DEFAULT_CLI_ACTOR: &str = "cli";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = &args[1];
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::new(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pool.run_migrations().await {
        eprintln!("Error running migrations: {}", e);
        std::process::exit(1);
    }

    let engine = match CutoverEngine::from_config(pool, &config).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error initializing engine: {}", e);
            std::process::exit(1);
        }
    };

    match command.as_str() {
        "register" => {
            let name = required_arg(&args, "--name", "-n");
            let actor = optional_arg(&args, "--actor", "-a")
                .unwrap_or_else(|| DEFAULT_CLI_ACTOR.to_string());
            register_table(&engine, &name, &actor).await;
        }
        "list" | "ls" => list_tables(&engine).await,
        "status" => {
            let name = required_arg(&args, "--name", "-n");
            show_status(&engine, &name).await;
        }
        "overview" => show_overview(&engine).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn optional_arg(args: &[String], long: &str, short: &str) -> Option<String> {
    let mut i = 2;
    while i < args.len() {
        if (args[i] == long || args[i] == short) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn required_arg(args: &[String], long: &str, short: &str) -> String {
    match optional_arg(args, long, short) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} is required", long);
            std::process::exit(1);
        }
    }
}

async fn register_table(engine: &CutoverEngine, name: &str, actor: &str) {
    match engine.register_table(name, actor, Utc::now()).await {
        Ok(table) => {
            println!(
                "Registered '{}' (attempt {}, id {}).",
                table.name, table.attempt, table.id
            );
        }
        Err(e) => {
            eprintln!("Error registering table: {}", e);
            std::process::exit(1);
        }
    }
}

async fn list_tables(engine: &CutoverEngine) {
    let tables = match engine.list_tables().await {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error listing tables: {}", e);
            std::process::exit(1);
        }
    };

    if tables.is_empty() {
        println!("No tables registered.");
        return;
    }

    println!();
    println!(
        "{:<32} {:<8} {:<12} {:<10} {:<10} {:<10}",
        "TABLE", "ATTEMPT", "STATUS", "READ", "WRITE", "DRIFT"
    );
    println!("{}", "-".repeat(86));

    for table in tables {
        let name = if table.name.len() > 30 {
            format!("{}...", &table.name[..27])
        } else {
            table.name.clone()
        };

        println!(
            "{:<32} {:<8} {:<12} {:<10} {:<10} {:<10.4}",
            name,
            table.attempt,
            table.status,
            table.read_source,
            table.write_source,
            table.drift_percentage
        );
    }
    println!();
}

async fn show_status(engine: &CutoverEngine, name: &str) {
    let table = match engine.get_status(name).await {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let checklist = engine.get_checklist(name).await.ok();

    println!();
    println!("Table:        {} (attempt {})", table.name, table.attempt);
    println!("Status:       {}", table.status);
    println!("Routing:      read={} write={}", table.read_source, table.write_source);
    println!("Validation:   {}", table.validation_status.as_str());
    println!(
        "Drift:        {:.4} (legacy {}, new {}, difference {})",
        table.drift_percentage,
        table.record_count_legacy,
        table.record_count_new,
        table.record_count_difference
    );
    println!(
        "Integrity:    {}",
        table.referential_integrity_status.as_str()
    );
    for issue in &table.referential_integrity_issues {
        println!("              - {}", issue);
    }
    if let Some(checklist) = checklist {
        let missing = checklist.unsatisfied();
        if missing.is_empty() {
            println!("Checklist:    complete");
        } else {
            let names: Vec<&str> = missing.iter().map(|g| g.as_str()).collect();
            println!("Checklist:    missing {}", names.join(", "));
        }
    }
    if let Some(at) = table.last_reconciled_at {
        println!("Reconciled:   {}", at.to_rfc3339());
    }
    if let Some(at) = table.cutover_date {
        println!("Completed:    {}", at.to_rfc3339());
    }
    if let Some(at) = table.rollback_date {
        println!(
            "Rolled back:  {} ({})",
            at.to_rfc3339(),
            table.rollback_reason.as_deref().unwrap_or("no reason recorded")
        );
    }
    println!();
}

async fn show_overview(engine: &CutoverEngine) {
    match engine.overview().await {
        Ok(overview) => {
            println!();
            println!("Tables:          {}", overview.total_tables);
            println!("  pending:       {}", overview.pending);
            println!("  ready:         {}", overview.ready);
            println!("  cutover:       {}", overview.cutover);
            println!("  completed:     {}", overview.completed);
            println!("  rolled back:   {}", overview.rolled_back);
            println!("Progress:        {:.2}%", overview.progress_percentage);
            println!("Active windows:  {}", overview.active_freeze_windows);
            println!("Open alerts:     {}", overview.open_alerts);
            println!();
        }
        Err(e) => {
            eprintln!("Error loading overview: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("Usage: manage-cutover-tables <command> [options]");
    println!();
    println!("Commands:");
    println!("  register --name <table> [--actor <name>]  Register a table (or its next attempt)");
    println!("  list                                     List every registered table");
    println!("  status --name <table>                    Show one table in detail");
    println!("  overview                                 Show the migration summary");
    println!("  help                                     Show this message");
}
