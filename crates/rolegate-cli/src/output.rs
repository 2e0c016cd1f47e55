use colored::Colorize;
use rolegate_authz::{FetchReport, PolicyTriple};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Warn about metadata categories that could not be fetched.
pub fn print_fetch_report(report: &FetchReport) {
    if report.is_complete() {
        return;
    }
    let failed: Vec<&str> = report.failed.iter().map(|c| c.as_str()).collect();
    print_warning(&format!(
        "Metadata unavailable ({}); results may under-report permissions",
        failed.join(", ")
    ));
}

pub fn print_decision(resource: &str, action: &str, allowed: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "resource": resource,
                "action": action,
                "allowed": allowed,
            });
            println!("{value}");
        }
        OutputFormat::Table => {
            let verdict = if allowed {
                "allowed".green()
            } else {
                "denied".red()
            };
            println!("{verdict}: {} on {}", action.cyan(), resource.cyan());
        }
    }
}

pub fn print_policies(policies: &[PolicyTriple], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(policies)?);
        }
        OutputFormat::Table => {
            if policies.is_empty() {
                println!("No permissions granted.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["Resource", "Action"]);
            for policy in policies {
                builder.push_record([policy.resource.as_str(), policy.action.as_str()]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!("Total: {}", policies.len());
        }
    }
    Ok(())
}

/// Shortens a credential for display.
pub fn abbreviate(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 8..].iter().collect();
        format!("{head}...{tail}")
    } else {
        secret.to_string()
    }
}
