//! FragDB - interactive shell

use std::env;
use std::sync::Arc;

use anyhow::Context;
use fragdb::executor::{EngineContext, Session};
use fragdb::server::{process_line, OutputFormat, Reply};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

/// Print welcome banner
fn print_banner() {
    println!(
        r#"
 FragDB v{}
 Fragment-oriented query shell
 Type '.help' for help, '.quit' to exit
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help                Show this help message
  .quit                Exit FragDB
  .mode json|table     Choose the result format
  .databases           List all databases
  .fragments <db>      List the fragments of a database
  .clear               Clear screen

Queries are key=value pairs separated by ';'. Multiple entries of one
key are separated by '|'. Binary arguments for ?1, ?2, ... follow the
query after a TAB as type:payload entries.

Examples:
  operation=create_db;db_name=sales
  operation=create_frag;frag_name=sales.t;field=id|v;field_type=long|double
  operation=multi_insert;value=1|10|2|20|3|30
  operation=select;from=sales.t;field=id|v;where=v > 15
  operation=create_frag_select;frag_name=sales.big;from=sales.t;field=id|oph_sum(v);group=id MOD 2
"#
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let engine = match args.iter().position(|a| a == "--data-dir" || a == "-d") {
        Some(i) => {
            let dir = args.get(i + 1).context("--data-dir expects a value")?;
            EngineContext::open(dir).with_context(|| format!("failed to open '{}'", dir))?
        }
        None => EngineContext::in_memory(),
    };

    let mut session = Session::new(Arc::new(engine));
    let mut format = OutputFormat::Table;
    let mut editor = DefaultEditor::new().context("failed to start line editor")?;

    print_banner();

    loop {
        let line = match editor.readline("fragdb> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        match trimmed {
            ".help" => {
                print_help();
                continue;
            }
            ".clear" => {
                print!("\x1B[2J\x1B[1;1H");
                continue;
            }
            _ => {}
        }

        match process_line(&mut session, &mut format, &line) {
            Some(Reply::Text(text)) => print!("{}", text),
            Some(Reply::Close(text)) => {
                print!("{}", text);
                return Ok(());
            }
            None => {}
        }
    }

    println!("\nGoodbye!");
    Ok(())
}
