use std::io;
use std::io::Write;

use crossterm::event::read;
use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEventKind;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use tagkeeper_core::moves::MoveBatch;
use tagkeeper_core::moves::MoveDecision;
use tagkeeper_core::state::EngineState;

fn read_key() -> io::Result<KeyCode> {
    enable_raw_mode()?;
    let code = loop {
        match read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => break key.code,
            _ => {}
        }
    };
    disable_raw_mode()?;
    Ok(code)
}

/// One confirmation covering every queued move: retag for the new
/// location, leave tags as they are, or cancel and move everything back.
pub fn prompt_decision(batch: &MoveBatch) -> io::Result<(MoveDecision, bool)> {
    if batch.moves.len() == 1 {
        let m = &batch.moves[0];
        println!("Moved: {} -> {}", m.old_path, m.path);
    } else {
        println!("{} files moved:", batch.moves.len());
        for m in &batch.moves {
            println!("  {} -> {}", m.old_path, m.path);
        }
    }
    print!("[r]etag for new location  [l]eave tags  [c]ancel (move back): ");
    io::stdout().flush()?;

    let decision = loop {
        match read_key()? {
            KeyCode::Char('r') | KeyCode::Char('R') => break MoveDecision::Retag,
            KeyCode::Char('l') | KeyCode::Char('L') => break MoveDecision::Leave,
            KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Esc => break MoveDecision::Cancel,
            _ => {}
        }
    };
    println!("{}", decision.label());

    if decision == MoveDecision::Cancel {
        return Ok((decision, false));
    }
    print!("Remember this choice for future moves? [y/N]: ");
    io::stdout().flush()?;
    let remember = matches!(read_key()?, KeyCode::Char('y') | KeyCode::Char('Y'));
    println!("{}", if remember { "yes" } else { "no" });
    Ok((decision, remember))
}

pub fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N]: ");
    io::stdout().flush()?;
    let answer = matches!(read_key()?, KeyCode::Char('y') | KeyCode::Char('Y'));
    println!("{}", if answer { "yes" } else { "no" });
    Ok(answer)
}

pub fn print_report(state: &EngineState) {
    let tracked_tags: usize = state
        .tracking
        .iter()
        .map(|(_, entry)| entry.auto_tags.len())
        .sum();
    println!("Folder rules:      {}", state.rules.len());
    println!("Tracked documents: {}", state.tracking.len());
    println!("Tracked tags:      {tracked_tags}");
    println!("History:           {} operation(s)", state.history.len());
    for op in state.history.operations().iter().take(10) {
        println!(
            "  {}  {:7}  {}  ({} file(s))",
            op.timestamp.format("%Y-%m-%d %H:%M"),
            op.kind.label(),
            op.description,
            op.files.len()
        );
    }
}
