use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use wastebin::{MatchMode, QueryOptions, TrashedEntry};

#[derive(Parser)]
#[command(name = "trashbin", about = "Move files to, and recover them from, the system trash")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one or more files or directories to the trash.
    Trash { paths: Vec<String> },
    /// Empty every reachable trash.
    Empty,
    /// Find previously trashed files by path or glob.
    #[command(alias = "lookup")]
    Query {
        paths: Vec<String>,
        #[arg(long)]
        glob: bool,
        #[arg(long)]
        failfast: bool,
    },
    /// Restore previously trashed files by path or glob.
    #[command(alias = "recover")]
    Restore {
        paths: Vec<String>,
        #[arg(long)]
        glob: bool,
        #[arg(long)]
        failfast: bool,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Trash { paths } => {
            if paths.is_empty() {
                bail!("trash requires at least one path");
            }
            wastebin::trash(&paths).context("failed to trash one or more paths")?;
        }
        Command::Empty => {
            wastebin::empty().context("failed to empty the trash")?;
        }
        Command::Query { paths, glob, failfast } => {
            if paths.is_empty() {
                bail!("query requires at least one path");
            }
            let mode = if glob { MatchMode::Globs } else { MatchMode::Paths };
            let mut options = QueryOptions::new(paths, mode);
            options.fail_fast = failfast;
            let result = wastebin::query(options).context("query failed")?;
            print_query_result(&result);
        }
        Command::Restore { paths, glob, failfast, force } => {
            if paths.is_empty() {
                bail!("restore requires at least one path");
            }
            let mode = if glob { MatchMode::Globs } else { MatchMode::Paths };
            let disambiguated: Vec<(String, Option<String>)> = paths.iter().map(|p| split_unique_id(p)).collect();
            let query_keys: Vec<String> = disambiguated.iter().map(|(key, _)| key.clone()).collect();
            let mut options = QueryOptions::new(query_keys, mode);
            options.fail_fast = failfast;
            let result = wastebin::query(options).context("query failed")?;
            restore_matches(result, &disambiguated, force)?;
        }
    }

    Ok(())
}

fn print_query_result(result: &wastebin::QueryResult) {
    for (key, matches) in &result.matches {
        println!("{}", key);
        for entry in matches {
            println!("  {}\t{}", entry.original_path.display(), entry.deletion_date);
        }
    }
    for failure in &result.failures {
        eprintln!("warning: {}", failure);
    }
}

/// Splits a trailing `@<uniqueId>` disambiguation suffix off a query
/// argument, so `restore ./a.txt@deadbeef` can select among several
/// trashed versions of the same original path.
fn split_unique_id(arg: &str) -> (String, Option<String>) {
    match arg.rsplit_once('@') {
        Some((path, id)) if !id.is_empty() => (path.to_string(), Some(id.to_string())),
        _ => (arg.to_string(), None),
    }
}

fn restore_matches(
    result: wastebin::QueryResult,
    disambiguated: &[(String, Option<String>)],
    force: bool,
) -> Result<()> {
    let mut had_error = false;
    for (key, matches) in result.matches {
        let unique_id = disambiguated.iter().find(|(k, _)| k == &key).and_then(|(_, id)| id.clone());
        let matches = match &unique_id {
            Some(id) => matches.into_iter().filter(|e| &e.unique_id == id).collect(),
            None => matches,
        };
        match matches.len() {
            0 => {
                eprintln!("{}: no matching file found", key);
                had_error = true;
            }
            1 => {
                let entry = matches.into_iter().next().unwrap();
                restore_one(&entry, force)?;
            }
            _ => {
                eprintln!("{}: multiple matching files found", key);
                for entry in &matches {
                    eprintln!("  {}\t{}\t@{}", entry.original_path.display(), entry.deletion_date, entry.unique_id);
                }
                eprintln!("  re-run with `{}@<uniqueId>` to pick one", key);
                had_error = true;
            }
        }
    }
    for failure in result.failures {
        eprintln!("warning: {}", failure);
    }
    if had_error {
        bail!("one or more paths could not be restored unambiguously");
    }
    Ok(())
}

fn restore_one(entry: &TrashedEntry, force: bool) -> Result<()> {
    entry.restore(force).with_context(|| format!("failed to restore {}", entry.original_path.display()))
}
