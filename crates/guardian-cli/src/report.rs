use console::style;

use guardian_core::{CheckOutcome, CycleSummary};

const NAME_WIDTH: usize = 20;
const TARGET_WIDTH: usize = 28;

/// One line per outcome, in the order given.
pub fn render_table(outcomes: &[CheckOutcome]) -> String {
    let mut out = format!(
        "  {:<NAME_WIDTH$} {:<TARGET_WIDTH$} {:<5} {:<6} {:>10}  {}\n",
        style("NAME").dim(),
        style("TARGET").dim(),
        style("PROTO").dim(),
        style("STATUS").dim(),
        style("LATENCY").dim(),
        style("ERROR").dim(),
    );
    out.push_str(&format!("  {}\n", style("─".repeat(84)).dim()));

    for o in outcomes {
        let ep = &o.endpoint;
        let status = format!("{:<6}", o.liveness());
        let status = if o.reachable {
            style(status).green().bold()
        } else {
            style(status).red().bold()
        };
        let latency = match o.latency_ms {
            Some(ms) => format!("{ms:.2}ms"),
            None => "-".to_string(),
        };
        out.push_str(&format!(
            "  {:<NAME_WIDTH$} {:<TARGET_WIDTH$} {:<5} {} {:>10}  {}\n",
            truncate(&ep.name, NAME_WIDTH),
            truncate(&format!("{}:{}", ep.host, ep.port), TARGET_WIDTH),
            ep.protocol.as_str(),
            status,
            latency,
            style(o.error.as_deref().unwrap_or_default()).dim(),
        ));
    }
    out
}

pub fn render_summary(summary: &CycleSummary) -> String {
    let down = summary.endpoints - summary.reachable;
    let down = if down == 0 {
        style(format!("{down} down")).dim()
    } else {
        style(format!("{down} down")).red().bold()
    };
    format!(
        "{} {}/{} up, {}",
        style("summary:").dim(),
        summary.reachable,
        summary.endpoints,
        down
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(width.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}
