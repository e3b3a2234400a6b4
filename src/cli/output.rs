//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for deepdive, including the
//! human-readable rendering of a [`RunResult`].

use owo_colors::OwoColorize;

use crate::research::{Persona, RunResult, RunStatus};
use crate::types::SentimentDirection;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the one-line banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                "\n   {} {}\n",
                "deepdive".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!("\n   deepdive v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            println!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a subheader
    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Print a table header row
    pub fn table_header(&self, columns: &[&str]) {
        let header: String = columns
            .iter()
            .map(|c| format!("{:<24}", c))
            .collect::<Vec<_>>()
            .join(" ");
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(columns.len() * 25).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(columns.len() * 25));
        }
    }

    /// Print a table row
    pub fn table_row(&self, values: &[&str]) {
        let row: String = values
            .iter()
            .map(|v| format!("{:<24}", v))
            .collect::<Vec<_>>()
            .join(" ");
        println!("    {}", row);
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }

    fn status_line(&self, result: &RunResult) {
        let label = format!(
            "{} ({} mode, {:.1}s)",
            result.status.as_str(),
            result.mode.as_str(),
            result.execution_time_ms as f64 / 1000.0
        );
        match result.status {
            RunStatus::Success => self.success(&label),
            RunStatus::PartialSuccess => self.warning(&label),
            RunStatus::Error => self.error(&label),
        }
    }

    /// Render a finished run
    pub fn report(&self, result: &RunResult) {
        self.header(&format!("Research: {}", result.topic));
        self.status_line(result);
        if let Some(error) = &result.error {
            self.error(error);
        }

        self.kv("session", &result.session_id);
        self.kv("depth", result.depth.as_str());
        if let Some(timeframe) = &result.timeframe {
            self.kv("timeframe", timeframe);
        }
        self.kv("confidence", &format!("{:.2}", result.findings.confidence_score));
        self.kv("sources analyzed", &result.sources_analyzed.to_string());
        if let Some(reason) = &result.findings.termination_reason {
            self.kv("stopped", reason);
        }

        if let Some(synthesis) = &result.findings.synthesis {
            let sentiment = &synthesis.sentiment;
            let direction = match sentiment.direction {
                SentimentDirection::Bullish if self.colored => format!("{}", "bullish".green()),
                SentimentDirection::Bearish if self.colored => format!("{}", "bearish".red()),
                other => other.to_string(),
            };
            self.kv(
                "sentiment",
                &format!(
                    "{} (score {:+.2}, consensus {:.2})",
                    direction, sentiment.score, sentiment.consensus
                ),
            );

            if !synthesis.narrative.is_empty() {
                self.subheader("Summary");
                for line in synthesis.narrative.lines().filter(|l| !l.trim().is_empty()) {
                    println!("    {}", line.trim());
                }
            }
            self.section("Key insights", &synthesis.key_insights);
            self.section("Risks", &synthesis.risk_assessment);
            self.section("Opportunities", &synthesis.opportunities);
        }

        if !result.citations.is_empty() {
            self.subheader("Sources");
            for citation in &result.citations {
                let title = if citation.title.is_empty() {
                    citation.url.as_str()
                } else {
                    citation.title.as_str()
                };
                if self.colored {
                    println!(
                        "    {} {} {}",
                        format!("[{}]", citation.id).dimmed(),
                        title,
                        format!("({:.2}) {}", citation.credibility, citation.url).dimmed()
                    );
                } else {
                    println!(
                        "    [{}] {} ({:.2}) {}",
                        citation.id, title, citation.credibility, citation.url
                    );
                }
            }
        }

        let metrics = &result.optimization_metrics;
        self.subheader("Run");
        self.kv(
            "tasks",
            &format!(
                "{} planned, {} completed, {} failed, {} stopped early, {} batched",
                metrics.tasks_planned,
                metrics.tasks_completed,
                metrics.tasks_failed,
                metrics.early_terminations,
                metrics.batched_tasks
            ),
        );
        self.kv(
            "llm calls",
            &format!(
                "{} ok, {} timed out, {} failed",
                metrics.calls.ok, metrics.calls.timed_out, metrics.calls.failed
            ),
        );
        if metrics.coordinator_fallback {
            self.warning("Parallel execution failed; fell back to sequential");
        }
    }

    fn section(&self, title: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        self.subheader(title);
        for item in items {
            self.list_item(item);
        }
    }

    /// Render the persona catalog
    pub fn personas<'a>(&self, personas: impl Iterator<Item = &'a Persona>) {
        self.header("Personas");
        for persona in personas {
            self.subheader(&persona.name);
            if !persona.description.is_empty() {
                println!("    {}", persona.description);
            }
            self.kv("focus", &persona.focus_areas.join(", "));
        }
    }
}
