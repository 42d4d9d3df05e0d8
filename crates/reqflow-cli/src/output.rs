//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use reqflow_core::orchestrator::{BatchSummary, Completion, ImportOutcome};
use reqflow_core::requirement::model::{Attachment, ContentFragment, IssueSeverity, Requirement};

/// Print requirements as a table.
pub fn print_requirements_table(records: &[Requirement], current: Option<&str>) {
    if records.is_empty() {
        println!("{}", "No requirements found. Import a document with 'reqflow import <file>'.".dimmed());
        return;
    }

    println!("  {} {} {}", pad_right("ID", 14), pad_right("Name", 40), "Quality");
    println!("{}", "─".repeat(66));

    for r in records {
        let marker = if current == Some(r.global_id.as_str()) { "▸".cyan() } else { " ".normal() };
        println!(
            "{} {} {} {}",
            marker,
            pad_right(&truncate_visual(&r.global_id, 14), 14).bold(),
            pad_right(&truncate_visual(&r.name, 40), 40),
            quality_label(r)
        );
    }

    println!();
    let analyzed = records.iter().filter(|r| r.is_analyzed()).count();
    println!(
        "{} requirement(s) {} {} analyzed",
        records.len().to_string().bold(),
        "·".dimmed(),
        analyzed.to_string().green()
    );
}

fn quality_label(r: &Requirement) -> ColoredString {
    match &r.analysis {
        None => "-".dimmed(),
        Some(_) if r.is_modified_since_analysis() => "modified".yellow(),
        Some(a) => score_colored(a.quality_score),
    }
}

fn score_colored(score: u8) -> ColoredString {
    let label = format!("{score}/10");
    match score {
        8..=10 => label.green(),
        5..=7 => label.yellow(),
        _ => label.red(),
    }
}

fn severity_colored(severity: IssueSeverity) -> ColoredString {
    match severity {
        IssueSeverity::High => "high".red().bold(),
        IssueSeverity::Medium => "medium".yellow(),
        IssueSeverity::Low => "low".dimmed(),
    }
}

/// Print a single requirement with its analysis.
pub fn print_requirement(r: &Requirement) {
    println!("{} {}", r.global_id.cyan().bold(), r.name.bold());
    println!();

    if !r.description.is_empty() {
        println!("{}", r.description);
        println!();
    }

    for (key, value) in &r.metadata {
        println!("{}: {}", key.bold(), value);
    }

    for fragment in &r.fragments {
        match fragment {
            ContentFragment::Paragraph { text } => println!("\n{}", text.dimmed()),
            ContentFragment::Table { rows } => {
                println!();
                for row in rows {
                    println!("  {}", row.join(" │ ").dimmed());
                }
            }
        }
    }

    let Some(analysis) = &r.analysis else {
        println!();
        println!("{}", "Not analyzed yet.".dimmed());
        return;
    };

    println!();
    println!(
        "{} {} {}",
        "Quality".bold(),
        score_colored(analysis.quality_score),
        format!("(analyzed {})", analysis.timestamp.format("%Y-%m-%d %H:%M")).dimmed()
    );
    if r.is_modified_since_analysis() {
        println!("{}", "Changed since the last analysis.".yellow());
    }
    if !analysis.feedback.is_empty() {
        println!("{}", analysis.feedback);
    }
    if !analysis.issues.is_empty() {
        println!();
        println!("{}", "Issues".bold());
        for issue in &analysis.issues {
            println!("  [{}] {}: {}", severity_colored(issue.severity), issue.category, issue.description);
        }
    }
    if !analysis.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations".bold());
        for (i, rec) in analysis.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, rec);
        }
    }
    if let Some(improved) = &analysis.improved_text {
        println!();
        println!("{}", "Suggested rewrite".bold());
        println!("  {}", improved.green());
    }
}

/// Print the result of an import.
pub fn print_import_outcome(outcome: &ImportOutcome, additive: bool) {
    match &outcome.completion {
        Completion::Succeeded if additive => println!(
            "{} Added {} new requirement(s), skipped {} already present {}",
            "✓".green().bold(),
            outcome.added.to_string().cyan(),
            outcome.skipped,
            elapsed_label(outcome.elapsed),
        ),
        Completion::Succeeded => println!(
            "{} Imported {} requirement(s) via {} {}",
            "✓".green().bold(),
            outcome.added.to_string().cyan(),
            outcome.method.as_deref().unwrap_or("unknown"),
            elapsed_label(outcome.elapsed),
        ),
        Completion::Failed(reason) => println!("{} Import failed: {}", "✗".red().bold(), reason),
        Completion::Cancelled => println!("{} Import cancelled", "!".yellow().bold()),
    }
}

/// Print the summary of a batch analysis.
pub fn print_batch_summary(summary: &BatchSummary) {
    if summary.total == 0 {
        println!("{}", "Nothing to analyze.".dimmed());
        return;
    }

    let icon = if summary.failed == 0 && !summary.cancelled {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!(
        "{} Analyzed {}/{} requirement(s): {} succeeded, {} failed{} {}",
        icon,
        summary.succeeded + summary.failed,
        summary.total,
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red(),
        if summary.skipped > 0 {
            format!(", {} skipped", summary.skipped)
        } else {
            String::new()
        },
        elapsed_label(summary.elapsed),
    );
    for failure in &summary.failures {
        println!("  {} {}: {}", "✗".red(), failure.global_id.bold(), failure.error);
    }
    if summary.cancelled {
        println!("{}", "Batch cancelled. Results analyzed so far were kept.".yellow());
    }
}

/// Print discovered attachments.
pub fn print_attachments(project_id: &str, attachments: &[Attachment]) {
    if attachments.is_empty() {
        println!("{}", format!("No attachments found for {project_id}.").dimmed());
        return;
    }

    println!("{}", format!("Attachments of {project_id}").bold());
    println!();
    for a in attachments {
        println!(
            "  {} {} {}",
            pad_right(&truncate_visual(&a.location, 48), 48),
            pad_right(&a.size_bytes.map(human_size).unwrap_or_default(), 10),
            a.mime_type.as_deref().unwrap_or("").dimmed()
        );
    }
    println!();
    println!("{} attachment(s)", attachments.len());
}

fn elapsed_label(elapsed: std::time::Duration) -> ColoredString {
    format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Pad a plain string to a given visual width (right-padded).
fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Truncate a string respecting visual width.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut result = String::new();
    let mut current_width = 0;
    for ch in s.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if current_width + ch_width > max_width - 2 {
            break;
        }
        result.push(ch);
        current_width += ch_width;
    }
    result.push_str("..");
    result
}
