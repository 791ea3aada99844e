use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::error;

use crate::client::ChatClient;
use crate::model::Message;
use crate::prompt::FormatStyle;
use crate::session::ChatSession;

const WRAP_WIDTH: usize = 100;

pub async fn run_repl(client: &ChatClient) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    println!("==========================================");
    println!("   chatline");
    println!("   model: {}", client.model());
    println!("   Type 'exit' or 'quit' to stop.");
    println!("   '/history' shows the conversation, '/reset' clears it.");
    println!("==========================================\n");

    let Some(raw_style) = prompt_line(
        &mut input,
        "Choose response format (plain/bullets/numbered) [plain]: ",
    )?
    else {
        return Ok(());
    };
    if !raw_style.is_empty() && !FormatStyle::is_known(&raw_style) {
        println!("Unknown format, defaulting to 'plain'.");
    }
    let mut session = ChatSession::new(client, FormatStyle::parse(&raw_style));

    loop {
        let Some(prompt) = prompt_line(&mut input, "\nYou: ")? else {
            break;
        };
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            break;
        }
        if prompt.eq_ignore_ascii_case("/reset") {
            session.reset();
            println!("conversation reset");
            continue;
        }
        if prompt.eq_ignore_ascii_case("/history") {
            print_history(session.history());
            continue;
        }

        match session.run_turn(&prompt).await {
            Ok(reply) => {
                println!("\nAssistant:\n");
                println!("{}", wrap_text(reply.trim(), WRAP_WIDTH));
            }
            Err(err) => {
                error!(code = err.code(), error = %err, "error during chat");
                println!("\n[Error] {err}");
            }
        }
    }

    println!("\nGoodbye");
    Ok(())
}

/// Runs a single plain-style turn and prints the reply.
pub async fn run_once(client: &ChatClient, prompt: &str) -> Result<()> {
    let mut session = ChatSession::new(client, FormatStyle::Plain);
    let reply = session
        .run_turn(prompt)
        .await
        .context("Chat request failed")?;
    println!("{}", reply.trim());
    Ok(())
}

fn prompt_line(input: &mut impl BufRead, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_history(history: &[Message]) {
    for (idx, msg) in history.iter().enumerate() {
        println!("[{}] {}: {}", idx, msg.role.as_str(), msg.content);
    }
}

/// Greedy word wrap that preserves the reply's own line breaks.
fn wrap_text(text: &str, width: usize) -> String {
    text.lines()
        .map(|line| {
            let mut wrapped = String::new();
            let mut current = 0;
            for word in line.split_whitespace() {
                let len = word.chars().count();
                if current > 0 && current + 1 + len > width {
                    wrapped.push('\n');
                    current = 0;
                } else if current > 0 {
                    wrapped.push(' ');
                    current += 1;
                }
                wrapped.push_str(word);
                current += len;
            }
            wrapped
        })
        .collect::<Vec<_>>()
        .join("\n")
}
