//! The interactive loop.
//!
//! A line-at-a-time read-eval-print loop: the prompt shows current
//! heap residency and shadow-stack depth, `@exit` leaves, `@sources`
//! lists the interned source table. Results print unless the session
//! is quiet; language errors print like any other value and the loop
//! continues.

use anyhow::Result;
use koan_core::{Interp, Kind, NodeId};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

fn print_sources(interp: &Interp) {
    let sources = interp.sources;
    if let Kind::Environment { map, .. } = interp.kind(sources) {
        for &item in interp.heap.map(map).items() {
            if let Kind::String(s) = interp.kind(item) {
                println!("{}", interp.str(s));
            }
        }
    }
}

pub fn interactive(interp: &mut Interp, quiet: bool, noeval: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut line_no = 1u32;

    loop {
        let prompt = if quiet {
            String::new()
        } else {
            format!("[{}]({})> ", interp.heap.live(), interp.heap.stack_top())
        };

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        };
        let _ = editor.add_history_entry(&line);

        match line.trim() {
            "" => continue,
            "@exit" => break,
            "@sources" => {
                print_sources(interp);
                continue;
            }
            _ => {}
        }

        if noeval {
            let mut at = 0usize;
            while at < line.len() {
                let (_, consumed, new_line) = interp.parse_text(&line[at..], 0, line_no, false);
                line_no = new_line;
                at += consumed;
                if consumed == 0 {
                    break;
                }
            }
            continue;
        }

        interp.process(&line, 0, &mut line_no, |interp, result| {
            if !quiet && result != NodeId::ZEN {
                println!("{}", interp.render(result, false));
            }
        });
        line_no += 1;
    }
    Ok(())
}
