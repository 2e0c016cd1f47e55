use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;
use rolegate_authz::{FileGrantStore, GrantStore, RawGrant, StoredGrant};

use crate::cli::LoginArgs;
use crate::output::{abbreviate, print_error, print_success};

pub fn login(store: &FileGrantStore, args: &LoginArgs) -> Result<()> {
    if args.subject.trim().is_empty() {
        anyhow::bail!("--subject must not be empty");
    }
    let grant = parse_grant(&args.grant)?;
    let resources = grant.len();

    store.save(&StoredGrant {
        subject_id: Some(args.subject.clone()),
        grant: Some(grant),
    })?;
    print_success(&format!(
        "Stored grant for {} ({resources} resources) in {}",
        abbreviate(&args.subject).cyan(),
        store.path().display()
    ));
    Ok(())
}

pub fn logout(store: &FileGrantStore) -> Result<()> {
    if store.path().exists() {
        store.clear()?;
        print_success("Logged out (grant removed)");
    } else {
        println!("No stored grant found");
    }
    Ok(())
}

pub fn whoami(store: &FileGrantStore) -> Result<()> {
    let stored = store.load()?;
    match stored.subject_id {
        Some(subject) => {
            println!("{}: {}", "Subject".cyan(), abbreviate(&subject));
            match stored.grant {
                Some(grant) => {
                    let permissions: usize = grant.values().map(Vec::len).sum();
                    println!(
                        "{}: {} resources, {} permission entries",
                        "Grant".cyan(),
                        grant.len(),
                        permissions
                    );
                }
                None => println!("{}: (none)", "Grant".cyan()),
            }
        }
        None => {
            print_error("Not logged in");
        }
    }
    Ok(())
}

/// Parses `--grant`: inline JSON, or `@path` to a JSON file.
fn parse_grant(arg: &str) -> Result<RawGrant> {
    let content = match arg.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read grant file {path}"))?
        }
        None => arg.to_string(),
    };
    serde_json::from_str(&content)
        .context("Grant must be a JSON object mapping resource IDs to permission ID arrays")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_grant() {
        let grant = parse_grant(r#"{"10": ["1", "2"]}"#).unwrap();
        assert_eq!(grant["10"], vec!["1", "2"]);
    }

    #[test]
    fn test_parse_grant_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grant.json");
        fs::write(&path, r#"{"11": ["3"]}"#).unwrap();

        let grant = parse_grant(&format!("@{}", path.display())).unwrap();
        assert_eq!(grant["11"], vec!["3"]);
    }

    #[test]
    fn test_parse_invalid_grant() {
        let err = parse_grant(r#"["10"]"#).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_login_then_logout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGrantStore::new(dir.path().join("grant.json"));

        login(
            &store,
            &LoginArgs {
                subject: "u1".to_string(),
                grant: r#"{"10": ["1"]}"#.to_string(),
            },
        )
        .unwrap();
        assert_eq!(store.subject_id().unwrap().as_deref(), Some("u1"));

        logout(&store).unwrap();
        assert!(!store.path().exists());
    }
}
