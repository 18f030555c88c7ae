//! Console front-end
//!
//! Typed lines stand in for the microphone. Commands start with `/`; any
//! other line is delivered to whichever capture session is listening.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tandem_lib::capture::TypedCapture;
use tandem_lib::language::Direction;
use tandem_lib::turn::{Presentation, StatusKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Manual(Direction),
    Automatic(Direction),
    Replay,
    Stop,
    Quit,
    Help,
    Utterance(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "/vi" => Command::Manual(Direction::ViToZh),
            "/zh" => Command::Manual(Direction::ZhToVi),
            "/auto-vi" => Command::Automatic(Direction::ViToZh),
            "/auto-zh" => Command::Automatic(Direction::ZhToVi),
            "/replay" => Command::Replay,
            "/stop" => Command::Stop,
            "/quit" | "/exit" => Command::Quit,
            "/help" => Command::Help,
            other => Command::Utterance(other.to_string()),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /vi        speak Vietnamese once, hear Chinese");
    println!("  /zh        speak Chinese once, hear Vietnamese");
    println!("  /auto-vi   toggle automatic Vietnamese -> Chinese");
    println!("  /auto-zh   toggle automatic Chinese -> Vietnamese");
    println!("  /replay    repeat the last translation");
    println!("  /stop      stop everything");
    println!("  /quit      exit");
    println!("Any other line is heard as speech while listening.");
}

fn kind_label(kind: StatusKind) -> &'static str {
    match kind {
        StatusKind::Neutral => "..",
        StatusKind::Listening => "mic",
        StatusKind::Translating => "txt",
        StatusKind::Speaking => "spk",
        StatusKind::Error => "ERR",
    }
}

async fn print_presentation(mut rx: watch::Receiver<Presentation>) {
    let mut last = rx.borrow().clone();

    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();

        if current.status != last.status && !current.status.message.is_empty() {
            println!(
                "[{}] {}",
                kind_label(current.status.kind),
                current.status.message
            );
        }

        if current.translation != last.translation {
            if let Some(translation) = &current.translation {
                println!("  {}", current.source_text);
                println!("  => {}", translation.translated_text);
                if !translation.annotation.is_empty() {
                    println!("     {}", translation.annotation);
                }
            }
        }

        last = current;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tandem_lib::init_logging();

    let config = tandem_lib::config::get_config()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;

    let (capture, utterances) =
        TypedCapture::new(Duration::from_secs(config.capture.silence_timeout_secs));
    let capture = Arc::new(capture);
    let (controller, handle) = tandem_lib::build_controller(&config, capture.clone());

    let driver = controller.spawn();
    let printer = tokio::spawn(print_presentation(handle.subscribe()));

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        match Command::parse(&line) {
            Command::Manual(direction) => {
                capture.mark_request();
                handle.manual(direction);
            }
            Command::Automatic(direction) => {
                capture.mark_request();
                handle.toggle_automatic(direction);
            }
            Command::Replay => handle.replay(),
            Command::Stop => handle.stop(),
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Utterance(text) => {
                if utterances.send(text).is_err() {
                    tracing::warn!("Capture input closed");
                }
            }
        }
    }

    handle.shutdown();
    driver.await.context("Turn controller task failed")?;
    printer.abort();

    Ok(())
}
