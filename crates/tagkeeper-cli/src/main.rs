use std::env;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use chrono::TimeZone;
use chrono::Utc;

use tagkeeper_core::bulk;
use tagkeeper_core::moves::MoveHandler;
use tagkeeper_core::moves::RenameOutcome;
use tagkeeper_core::persistence::restore;
use tagkeeper_core::persistence::snapshot;
use tagkeeper_core::persistence::StateStore;
use tagkeeper_core::state::EngineState;
use tagkeeper_core::state::Settings;
use tagkeeper_core::store::DocumentStore;
use tagkeeper_core::tags::WriteOutcome;
use tagkeeper_core::validate;
use tagkeeper_core::validate::IssueFix;
use tagkeeper_core::validate::IssueKind;
use tagkeeper_vault::vault::VaultStore;

mod config;
mod ui;

use config::Config;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> CliResult {
    let (vault, args) = parse_vault_arg(env::args().skip(1).collect())?;
    let Some(command) = args.first().cloned() else {
        print_help();
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("tagkeeper {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "tag" => cmd_tag(&vault, &expect_arg(rest, 0, "tag <file>")?),
        "apply" => cmd_apply(&vault, parse_folder_flag(rest)?),
        "remove-auto" => cmd_remove_auto(&vault),
        "remove-all" => cmd_remove_all(&vault),
        "remove-folder" => cmd_remove_folder(&vault, &expect_arg(rest, 0, "remove-folder <path>")?),
        "remove-since" => cmd_remove_since(&vault, &expect_arg(rest, 0, "remove-since <YYYY-MM-DD>")?),
        "move" => cmd_move(
            &vault,
            &expect_arg(rest, 0, "move <from> <to>")?,
            &expect_arg(rest, 1, "move <from> <to>")?,
        ),
        "undo" => cmd_undo(&vault, rest.first().map(String::as_str)),
        "report" => cmd_report(&vault),
        "validate" => cmd_validate(&vault, rest.iter().any(|arg| arg == "--fix")),
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

struct Session {
    state: EngineState,
    store: VaultStore,
    state_store: StateStore,
}

impl Session {
    fn save(&self) -> io::Result<()> {
        self.state_store.save(&snapshot(&self.state))
    }
}

fn open_session(vault: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    let store = VaultStore::open(vault)?;
    let state_store = StateStore::open(vault.join(".tagkeeper/state.json"))?;
    let mut state = match state_store.load()? {
        Some(persisted) => restore(persisted),
        None => EngineState::new(Settings::default()),
    };
    Config::load(vault)?.apply_to(&mut state.settings);
    Ok(Session {
        state,
        store,
        state_store,
    })
}

fn progress(done: usize) {
    eprintln!("  … {done} processed");
}

fn cmd_tag(vault: &Path, file: &str) -> CliResult {
    let mut session = open_session(vault)?;
    let report = bulk::tag_document(&mut session.state, &mut session.store, file, Utc::now())?;
    session.save()?;
    match report.outcome {
        WriteOutcome::MissingTarget => println!("{file}: not found, nothing applied"),
        WriteOutcome::Applied { changed: true } => {
            println!("{file}: applied {}", report.resolved.join(", "))
        }
        WriteOutcome::Applied { changed: false } if report.resolved.is_empty() => {
            println!("{file}: no rule tags for this location")
        }
        WriteOutcome::Applied { changed: false } => {
            println!("{file}: already tagged ({})", report.resolved.join(", "))
        }
    }
    Ok(())
}

fn cmd_apply(vault: &Path, folder: Option<String>) -> CliResult {
    let mut session = open_session(vault)?;
    let summary = bulk::bulk_apply(
        &mut session.state,
        &mut session.store,
        folder.as_deref(),
        &mut progress,
        Utc::now(),
    )?;
    session.save()?;
    println!(
        "Applied folder tags: {} tagged, {} skipped, {} failed ({} processed)",
        summary.changed, summary.skipped, summary.failed, summary.processed
    );
    Ok(())
}

fn cmd_remove_auto(vault: &Path) -> CliResult {
    let mut session = open_session(vault)?;
    let summary =
        bulk::remove_all_auto(&mut session.state, &mut session.store, &mut progress, Utc::now())?;
    session.save()?;
    println!(
        "Removed auto tags: {} changed, {} skipped, {} failed",
        summary.changed, summary.skipped, summary.failed
    );
    Ok(())
}

fn cmd_remove_all(vault: &Path) -> CliResult {
    if !ui::confirm("Remove every tag, user-entered included, from every document?")? {
        println!("Aborted.");
        return Ok(());
    }
    let mut session = open_session(vault)?;
    let summary =
        bulk::remove_all_tags(&mut session.state, &mut session.store, &mut progress, Utc::now())?;
    session.save()?;
    println!(
        "Removed all tags: {} changed, {} skipped, {} failed",
        summary.changed, summary.skipped, summary.failed
    );
    Ok(())
}

fn cmd_remove_folder(vault: &Path, folder: &str) -> CliResult {
    let mut session = open_session(vault)?;
    let summary = bulk::remove_by_folder(
        &mut session.state,
        &mut session.store,
        folder,
        &mut progress,
        Utc::now(),
    )?;
    session.save()?;
    println!(
        "Removed auto tags under {folder}: {} changed, {} skipped, {} failed",
        summary.changed, summary.skipped, summary.failed
    );
    Ok(())
}

fn cmd_remove_since(vault: &Path, date: &str) -> CliResult {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or("invalid date")?;
    let cutoff = Utc.from_utc_datetime(&midnight);

    let mut session = open_session(vault)?;
    let summary = bulk::remove_since(
        &mut session.state,
        &mut session.store,
        cutoff,
        &mut progress,
        Utc::now(),
    )?;
    session.save()?;
    println!(
        "Removed auto tags applied since {date}: {} changed, {} skipped, {} failed",
        summary.changed, summary.skipped, summary.failed
    );
    Ok(())
}

fn cmd_move(vault: &Path, from: &str, to: &str) -> CliResult {
    let mut session = open_session(vault)?;
    let mut handler = MoveHandler::new();

    session.store.rename(from, to)?;
    let outcome = handler.on_rename(&mut session.state, &mut session.store, from, to, Utc::now())?;
    match outcome {
        RenameOutcome::Queued => {
            let batch = loop {
                thread::sleep(Duration::from_millis(25));
                if let Some(batch) = handler.poll(Utc::now()) {
                    break batch;
                }
            };
            let (decision, remember) = ui::prompt_decision(&batch)?;
            let report = handler.apply_decision(
                &mut session.state,
                &mut session.store,
                batch,
                decision,
                &[],
                remember,
                Utc::now(),
            )?;
            session.save()?;
            println!(
                "Move {}: {} file(s) updated, {} failed",
                decision.label(),
                report.applied,
                report.failed
            );
        }
        RenameOutcome::PureRename => {
            session.save()?;
            println!("Renamed in place; tracking and history follow the new name.");
        }
        RenameOutcome::PolicyRetagged => {
            session.save()?;
            println!("Moved and retagged per the saved policy.");
        }
        RenameOutcome::PolicyLeft => {
            session.save()?;
            println!("Moved; tags left as they were per the saved policy.");
        }
        RenameOutcome::IgnoredDestination => {
            println!("Moved into an ignored path; nothing to do.");
        }
        RenameOutcome::SuppressedCorrective => {
            println!("Corrective rename; nothing to do.");
        }
    }
    handler.teardown();
    Ok(())
}

fn cmd_undo(vault: &Path, op_id: Option<&str>) -> CliResult {
    let mut session = open_session(vault)?;
    let id = match op_id {
        Some(id) => id.to_string(),
        None => match session.state.history.latest_id() {
            Some(id) => id.to_string(),
            None => {
                println!("Nothing to undo.");
                return Ok(());
            }
        },
    };

    let report = session.state.history.undo(
        &mut session.state.tracking,
        &mut session.store,
        &id,
        Utc::now(),
    )?;
    match report {
        Some(report) => {
            session.save()?;
            println!(
                "Undid {id}: {} file(s) restored, {} failed",
                report.restored, report.failed
            );
        }
        None => println!("No such operation: {id}"),
    }
    Ok(())
}

fn cmd_report(vault: &Path) -> CliResult {
    let session = open_session(vault)?;
    ui::print_report(&session.state);
    Ok(())
}

fn cmd_validate(vault: &Path, fix: bool) -> CliResult {
    let mut session = open_session(vault)?;
    let issues = validate::scan(&session.state, &session.store);
    if issues.is_empty() {
        println!("Tracking is consistent; no issues found.");
        return Ok(());
    }

    for issue in &issues {
        println!("  {}: {}", issue.path, issue.kind.describe());
    }
    if !fix {
        println!(
            "{} issue(s) found (run with --fix to repair)",
            issues.len()
        );
        return Ok(());
    }

    let mut fixed = 0;
    let mut failed = 0;
    for issue in &issues {
        let repair = match issue.kind {
            IssueKind::DriftedTags { .. } => IssueFix::Reapply,
            IssueKind::MissingDocument | IssueKind::IgnoredLocation => IssueFix::Drop,
        };
        match validate::fix_issue(&mut session.state, &mut session.store, issue, repair, Utc::now())
        {
            Ok(_) => fixed += 1,
            Err(_) => failed += 1,
        }
    }
    session.save()?;
    println!("Validation: {fixed} issue(s) repaired, {failed} failed");
    Ok(())
}

fn parse_vault_arg(args: Vec<String>) -> Result<(PathBuf, Vec<String>), Box<dyn std::error::Error>> {
    let mut vault = PathBuf::from(".");
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--vault" {
            let Some(value) = args.get(i + 1) else {
                return Err("--vault requires a path".into());
            };
            vault = PathBuf::from(value);
            i += 2;
        } else {
            rest.push(args[i].clone());
            i += 1;
        }
    }
    Ok((vault, rest))
}

fn parse_folder_flag(args: &[String]) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--folder" {
            let Some(value) = args.get(i + 1) else {
                return Err("--folder requires a path".into());
            };
            return Ok(Some(value.clone()));
        }
        i += 1;
    }
    Ok(None)
}

fn expect_arg(
    args: &[String],
    idx: usize,
    usage: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    args.get(idx)
        .filter(|arg| !arg.starts_with("--"))
        .cloned()
        .ok_or_else(|| format!("usage: tagkeeper {usage}").into())
}

fn print_help() {
    println!(
        "tagkeeper — folder-rule driven tag lifecycle for markdown vaults

Usage: tagkeeper [--vault <path>] <command>

Commands:
  tag <file>                  Apply folder-rule tags to one document
  apply [--folder <path>]     Apply folder-rule tags across the vault or one folder
  remove-auto                 Remove every tag this tool applied
  remove-all                  Remove every tag from every document (destructive)
  remove-folder <path>        Remove applied tags from documents under a folder
  remove-since <YYYY-MM-DD>   Remove tags applied on or after a date
  move <from> <to>            Relocate a document and decide how its tags follow
  undo [<op-id>]              Restore the exact state before an operation
  report                      Show rules, tracking and history counts
  validate [--fix]            Check tracking against the vault, optionally repair
  help                        Show this help
  version                     Show the version"
    );
}
