//! Node template and readiness tables.
//!
//! Renders NodeGroup node templates and node readiness as kubectl-style
//! tables.

use colored::Colorize;
use serde_json::Value;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::converge::nodegroup::NodeTemplates;
use crate::readiness::ReadinessSnapshot;

/// Row for the node template table.
#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "NODEGROUP")]
    node_group: String,
    #[tabled(rename = "LABELS")]
    labels: String,
    #[tabled(rename = "ANNOTATIONS")]
    annotations: String,
    #[tabled(rename = "TAINTS")]
    taints: String,
}

/// Row for the node readiness table.
#[derive(Tabled)]
struct ReadinessRow {
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

/// Print the node templates of all NodeGroups.
pub fn print_templates(templates: &NodeTemplates, context_name: &str) {
    if templates.is_empty() {
        println!("No NodeGroups found.");
        return;
    }

    let with_template = templates.values().filter(|t| t.is_some()).count();
    println!(
        "{} (context: {}, {} nodegroups, {} with node template):",
        "NodeGroup templates".bold(),
        context_name,
        templates.len(),
        with_template
    );
    println!("{}", render_templates(templates));
}

fn render_templates(templates: &NodeTemplates) -> String {
    let rows: Vec<TemplateRow> = templates
        .iter()
        .map(|(name, template)| match template {
            Some(t) => TemplateRow {
                node_group: name.clone(),
                labels: format_map(t.get("labels")),
                annotations: format_map(t.get("annotations")),
                taints: format_taints(t.get("taints")),
            },
            None => TemplateRow {
                node_group: name.clone(),
                labels: "<none>".to_string(),
                annotations: "<none>".to_string(),
                taints: "<none>".to_string(),
            },
        })
        .collect();

    let mut table = Table::new(&rows);
    apply_table_style(&mut table);
    table.to_string()
}

/// Print per-node readiness with a `Nodes Ready r of d` header.
pub fn print_readiness(snapshot: &ReadinessSnapshot) {
    let header = format!(
        "Nodes Ready {} of {}",
        snapshot.ready_count(),
        snapshot.desired_count
    );
    if snapshot.is_satisfied() {
        println!("{}", header.green().bold());
    } else {
        println!("{}", header.yellow().bold());
    }
    if !snapshot.observed.is_empty() {
        println!("{}", render_readiness(snapshot));
    }
}

fn render_readiness(snapshot: &ReadinessSnapshot) -> String {
    let rows: Vec<ReadinessRow> = snapshot
        .observed
        .iter()
        .map(|r| ReadinessRow {
            node: r.name.clone(),
            status: if r.ready {
                "Ready".green().to_string()
            } else {
                "NotReady".red().to_string()
            },
        })
        .collect();

    let mut table = Table::new(&rows);
    apply_table_style(&mut table);
    table.to_string()
}

/// `key=value` pairs joined by commas, `-` when empty.
fn format_map(value: Option<&Value>) -> String {
    let Some(map) = value.and_then(Value::as_object).filter(|m| !m.is_empty()) else {
        return "-".to_string();
    };
    map.iter()
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{}={}", k, s),
            None => format!("{}={}", k, v),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Taints in kubectl notation: `key=value:Effect`.
fn format_taints(value: Option<&Value>) -> String {
    let Some(taints) = value.and_then(Value::as_array).filter(|t| !t.is_empty()) else {
        return "-".to_string();
    };
    taints
        .iter()
        .map(|taint| {
            let key = taint.get("key").and_then(Value::as_str).unwrap_or_default();
            let effect = taint.get("effect").and_then(Value::as_str).unwrap_or_default();
            match taint.get("value").and_then(Value::as_str) {
                Some(v) if !v.is_empty() => format!("{}={}:{}", key, v, effect),
                _ => format!("{}:{}", key, effect),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// kubectl-like layout: no borders, two spaces between columns.
fn apply_table_style(table: &mut Table) {
    use tabled::settings::object::Columns;
    use tabled::settings::themes::Theme;
    use tabled::settings::{Modify, Padding};

    let mut theme = Theme::from_style(Style::empty());
    theme.remove_horizontal_lines();
    table.with(theme);
    table.with(Modify::new(Columns::new(..)).with(Padding::new(0, 2, 0, 0)));
}
