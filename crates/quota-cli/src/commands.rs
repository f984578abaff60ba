use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use quota_engine::QuotaEngine;
use quota_store::{InMemoryNodeStore, NodeStore};
use quota_types::Node;

use crate::cli::*;
use crate::replay::{load_steps, replay, StepReport, StepStatus};
use crate::snapshot::{load_config, load_store, save_store};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Usage(args) => cmd_usage(args, cli.format),
        Command::Replay(args) => cmd_replay(args, cli.format),
    }
}

/// One line of the usage table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageRow {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub inner_size: u64,
    pub total_size: u64,
    pub max_size: Option<u64>,
    pub trash_size: u64,
    pub versions_size: u64,
    pub over_limit: bool,
}

/// Every node below each root, depth-first in child order.
pub fn usage_rows(store: &InMemoryNodeStore) -> anyhow::Result<Vec<UsageRow>> {
    let mut rows = Vec::new();
    for root in store.roots()? {
        let mut stack: Vec<(Node, usize)> = store
            .children(&root.id)?
            .into_iter()
            .rev()
            .map(|child| (child, 0))
            .collect();
        while let Some((node, depth)) = stack.pop() {
            let meta = store.read_quota_metadata(&node.id)?.unwrap_or_default();
            for child in store.children(&node.id)?.into_iter().rev() {
                stack.push((child, depth + 1));
            }
            rows.push(UsageRow {
                id: node.id.to_string(),
                name: node.name,
                depth,
                inner_size: meta.inner_size,
                total_size: meta.total_size,
                max_size: meta.max_size,
                trash_size: meta.trash_size,
                versions_size: meta.versions_size,
                over_limit: meta.is_over_limit(),
            });
        }
    }
    Ok(rows)
}

fn recompute_all(engine: &QuotaEngine<InMemoryNodeStore>) -> anyhow::Result<usize> {
    let mut over_limit = 0;
    for root in engine.store().roots()? {
        over_limit += engine.recompute(&root.id)?.over_limit.len();
    }
    Ok(over_limit)
}

fn cmd_usage(args: UsageArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = load_store(&args.snapshot)?;
    let engine = QuotaEngine::with_config(Arc::new(store), config)?;
    recompute_all(&engine)?;

    let mut rows = usage_rows(engine.store())?;
    if args.over_limit {
        rows.retain(|row| row.over_limit);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => print_usage(&rows),
    }
    Ok(())
}

fn print_usage(rows: &[UsageRow]) {
    if rows.is_empty() {
        println!("No nodes.");
        return;
    }
    println!(
        "{:<40} {:>12} {:>12} {:>12} {:>12}",
        "NODE".bold(),
        "TOTAL".bold(),
        "LIMIT".bold(),
        "TRASH".bold(),
        "VERSIONS".bold()
    );
    for row in rows {
        let label = if row.name.is_empty() { &row.id } else { &row.name };
        let node = format!("{}{}", "  ".repeat(row.depth), label);
        let limit = row
            .max_size
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "-".into());
        let total = format!("{:>12}", row.total_size);
        let total = if row.over_limit { total.red().bold() } else { total.normal() };
        println!(
            "{:<40} {} {:>12} {:>12} {:>12}{}",
            node,
            total,
            limit.dimmed(),
            row.trash_size,
            row.versions_size,
            if row.over_limit { "  over limit".red().to_string() } else { String::new() }
        );
    }
}

fn cmd_replay(args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = load_store(&args.snapshot)?;
    let engine = QuotaEngine::with_config(Arc::new(store), config)?;
    if args.recompute {
        recompute_all(&engine)?;
    }

    let steps = load_steps(&args.events)?;
    let reports = replay(&engine, &steps);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print_replay(&reports),
    }

    if let Some(output) = &args.output {
        save_store(engine.store(), output)?;
        if format == OutputFormat::Text {
            println!("{} Wrote snapshot to {}", "✓".green(), output.display());
        }
    }

    let failed = reports
        .iter()
        .filter(|r| r.status == StepStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} steps failed", reports.len());
    }
    Ok(())
}

fn print_replay(reports: &[StepReport]) {
    for report in reports {
        let status = match report.status {
            StepStatus::Changed => "changed".cyan(),
            StepStatus::Applied => "applied".green(),
            StepStatus::Skipped => "skipped".dimmed(),
            StepStatus::Ignored => "ignored".dimmed(),
            StepStatus::QuotaExceeded => "quota exceeded".red().bold(),
            StepStatus::Failed => "failed".red(),
        };
        println!(
            "{:>4}  {:<48} {:<16} {}",
            report.step + 1,
            report.label,
            status,
            report.detail
        );
    }
    let exceeded = reports
        .iter()
        .filter(|r| r.status == StepStatus::QuotaExceeded)
        .count();
    println!(
        "\n{} steps, {} quota violations",
        reports.len().to_string().bold(),
        exceeded.to_string().bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_types::NodeId;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    #[test]
    fn rows_follow_tree_order_after_recompute() {
        let store = InMemoryNodeStore::with_root(id("root"));
        store.insert_node(Node::child(id("b"), id("root"), "b", 0)).unwrap();
        store.insert_node(Node::child(id("a"), id("root"), "a", 0)).unwrap();
        store.insert_node(Node::child(id("a1"), id("a"), "a1", 70)).unwrap();
        store.insert_node(Node::child(id("b1"), id("b"), "b1", 30)).unwrap();
        store.set_max_size(&id("a"), Some(50)).unwrap();

        let engine = QuotaEngine::new(Arc::new(store));
        assert_eq!(recompute_all(&engine).unwrap(), 1);

        let rows = usage_rows(engine.store()).unwrap();
        let names: Vec<(&str, usize)> = rows.iter().map(|r| (r.name.as_str(), r.depth)).collect();
        assert_eq!(names, vec![("a", 0), ("a1", 1), ("b", 0), ("b1", 1)]);
        assert_eq!(rows[0].total_size, 70);
        assert!(rows[0].over_limit);
        assert!(!rows[2].over_limit);
    }

    #[test]
    fn replay_command_writes_output_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("tree.json");
        let events = dir.path().join("events.json");
        let output = dir.path().join("after.json");
        std::fs::write(
            &snapshot,
            r#"{"nodes": [{"id": "root"}, {"id": "docs", "parent": "root", "name": "docs"}]}"#,
        )
        .unwrap();
        std::fs::write(
            &events,
            r#"[
                {"op": "insert", "node": {"id": "a", "parent": "docs", "name": "a", "content_size": 42}},
                {"name": "document_created", "target": "a"}
            ]"#,
        )
        .unwrap();

        cmd_replay(
            ReplayArgs {
                snapshot,
                events,
                config: None,
                recompute: false,
                output: Some(output.clone()),
            },
            OutputFormat::Json,
        )
        .unwrap();

        let after = load_store(&output).unwrap();
        assert_eq!(
            after.read_quota_metadata(&id("docs")).unwrap().unwrap().total_size,
            42
        );
    }

    #[test]
    fn replay_command_fails_on_infrastructure_errors() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("tree.json");
        let events = dir.path().join("events.json");
        std::fs::write(&snapshot, r#"{"nodes": [{"id": "root"}]}"#).unwrap();
        std::fs::write(&events, r#"[{"name": "document_created", "target": "ghost"}]"#).unwrap();

        let err = cmd_replay(
            ReplayArgs {
                snapshot,
                events,
                config: None,
                recompute: false,
                output: None,
            },
            OutputFormat::Json,
        )
        .unwrap_err();
        assert!(err.to_string().contains("1 of 1 steps failed"));
    }
}
