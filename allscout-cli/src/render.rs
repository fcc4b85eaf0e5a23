use allscout::{IndexStatus, ProgressSink, ProgressUpdate, SearchOutput, SearchResult};
use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, SystemTime};

const MARK_OPEN: &str = "<mark class=\"hl-";
const MARK_CLOSE: &str = "</mark>";
const PALETTE: [Color; 4] = [Color::Yellow, Color::Cyan, Color::Magenta, Color::Green];

/// Progress bar on stderr, driven by the cumulative percentage of each update
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&self, update: ProgressUpdate) {
        if let Some(percent) = update.increment {
            self.bar.set_position(percent.round() as u64);
        }
        if let Some(message) = update.message {
            self.bar.set_message(message);
        }
    }
}

pub fn print_output(output: &SearchOutput, stats_only: bool) {
    if !stats_only {
        for result in &output.results {
            print_result(result);
        }
    }
    println!("\n{}", summary(output));
}

pub fn summary(output: &SearchOutput) -> String {
    format!(
        "Found {} files with {} matches ({} files searched, answered by {})",
        output.len(),
        output.total_matches,
        output.files_searched,
        output.source
    )
}

fn print_result(result: &SearchResult) {
    let counts = result
        .matches
        .iter()
        .map(|m| format!("{}: {}", m.keyword, m.count()))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "\n{} {}",
        result.relative_path.blue().bold(),
        format!("({})", counts).dimmed()
    );

    let Some(preview) = &result.preview else {
        return;
    };
    for (i, snippet) in preview.snippets.iter().enumerate() {
        if i > 0 {
            println!("{}", "    ...".dimmed());
        }
        for (offset, line) in snippet.highlighted.split('\n').enumerate() {
            let number = format!("{:>6}", snippet.start_line + offset);
            println!("{}: {}", number.green(), colorize_marks(line));
        }
    }
}

/// Turns `<mark class="hl-N">` spans into terminal colors and unescapes the rest
pub fn colorize_marks(highlighted: &str) -> String {
    let mut out = String::with_capacity(highlighted.len());
    let mut rest = highlighted;
    while let Some(start) = rest.find(MARK_OPEN) {
        out.push_str(&unescape(&rest[..start]));
        let after_open = &rest[start + MARK_OPEN.len()..];
        let Some(class_end) = after_open.find("\">") else {
            out.push_str(&unescape(&rest[start..]));
            return out;
        };
        let class: usize = after_open[..class_end].parse().unwrap_or(0);
        let body = &after_open[class_end + 2..];
        let Some(close) = body.find(MARK_CLOSE) else {
            out.push_str(&unescape(&rest[start..]));
            return out;
        };
        let text = unescape(&body[..close]);
        let colored = text.color(PALETTE[class % PALETTE.len()]).bold();
        out.push_str(&colored.to_string());
        rest = &body[close + MARK_CLOSE.len()..];
    }
    out.push_str(&unescape(rest));
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn print_status(status: &IndexStatus) {
    println!("{}", status.location.display().to_string().blue().bold());
    println!("  schema version: {}", status.schema_version);
    println!(
        "  files:          {} ({} skipped)",
        status.total_files, status.skipped_files
    );
    println!("  words:          {}", status.total_words);
    println!("  created:        {}", timestamp(status.created_at));
    println!("  updated:        {}", timestamp(status.updated_at));
}

fn timestamp(time: SystemTime) -> String {
    let age = match SystemTime::now().duration_since(time) {
        Ok(elapsed) if elapsed.as_secs() > 0 => format!(
            "{} ago",
            humantime::format_duration(Duration::from_secs(elapsed.as_secs()))
        ),
        _ => "just now".to_string(),
    };
    format!("{} ({})", humantime::format_rfc3339_seconds(time), age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_marks_plain() {
        colored::control::set_override(false);
        assert_eq!(
            colorize_marks("a <mark class=\"hl-0\">b</mark> &lt;c&gt; &amp;lt;"),
            "a b <c> &lt;"
        );
        assert_eq!(colorize_marks("no marks"), "no marks");
    }

    #[test]
    fn test_colorize_marks_malformed() {
        colored::control::set_override(false);
        assert_eq!(
            colorize_marks("x <mark class=\"hl-2\">open"),
            "x <mark class=\"hl-2\">open"
        );
    }
}
