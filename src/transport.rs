//! Interactive transport loop.
//!
//! Reads line commands from stdin on a helper thread and drives the narration
//! controller between commands by calling `tick()` at a fixed cadence. Ctrl-C
//! tears the session down cleanly so the position is saved for next time.

use crate::narration::NarrationController;
use crate::paragraphs::Paragraph;
use crate::playback::PlaybackSurface;
use crate::synthesis::Synthesizer;
use anyhow::{Context, Result};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{TryRecvError, channel};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

enum Command {
    Toggle,
    SkipForward,
    SkipBackward,
    Seek(f32),
    FromParagraph(usize),
    Status,
    ClearCache,
    ClearPosition,
    ClearAll,
    Help,
    Quit,
    Noop,
    Unknown(String),
}

pub fn run<Y, P>(
    mut controller: NarrationController<Y, P>,
    paragraphs: Vec<Paragraph>,
    tick_interval: Duration,
) -> Result<()>
where
    Y: Synthesizer + Clone + Send + 'static,
    P: PlaybackSurface,
{
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let (lines_tx, lines_rx) = channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    print_help();
    let mut stdin_open = true;
    let mut last_shown_index: Option<usize> = None;

    loop {
        if interrupted.load(Ordering::SeqCst) {
            info!("Interrupted; shutting down");
            break;
        }

        if stdin_open {
            match lines_rx.try_recv() {
                Ok(line) => match parse_command(&line) {
                    Command::Toggle => controller.toggle_narration(),
                    Command::SkipForward => controller.skip_forward(),
                    Command::SkipBackward => controller.skip_backward(),
                    Command::Seek(percent) => controller.seek_to_percent(percent),
                    Command::FromParagraph(number) => {
                        // Commands are 1-based; the controller is 0-based.
                        controller.start_from_paragraph(
                            number.saturating_sub(1),
                            paragraphs.clone(),
                        );
                    }
                    Command::Status => print_status(&controller),
                    Command::ClearCache => {
                        controller.clear_book_data();
                        println!("Cleared cached audio and saved position for this book.");
                    }
                    Command::ClearPosition => {
                        controller.clear_saved_position();
                        println!("Cleared the saved position for this book.");
                    }
                    Command::ClearAll => {
                        controller.clear_all_data();
                        println!("Cleared all cached audio and saved positions.");
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Noop => {}
                    Command::Unknown(word) => {
                        println!("Unknown command '{word}'; type 'help' for commands.");
                    }
                },
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    debug!("Stdin closed; continuing until Ctrl-C");
                    stdin_open = false;
                }
            }
        }

        controller.tick();

        let index = controller.current_paragraph_index();
        if controller.is_playing() && index != last_shown_index {
            if let Some(index) = index {
                println!(
                    "Narrating paragraph {}/{}",
                    index + 1,
                    controller.paragraph_count()
                );
            }
            last_shown_index = index;
        }

        thread::sleep(tick_interval);
    }

    controller.stop();
    Ok(())
}

fn parse_command(line: &str) -> Command {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Command::Noop;
    };
    match word.to_ascii_lowercase().as_str() {
        "p" | "play" | "pause" | "toggle" => Command::Toggle,
        "f" | "forward" => Command::SkipForward,
        "b" | "back" => Command::SkipBackward,
        "seek" => match parts.next().and_then(|v| v.parse::<f32>().ok()) {
            Some(percent) => Command::Seek(percent),
            None => Command::Unknown(line.trim().to_string()),
        },
        "from" => match parts.next().and_then(|v| v.parse::<usize>().ok()) {
            Some(number) if number > 0 => Command::FromParagraph(number),
            _ => Command::Unknown(line.trim().to_string()),
        },
        "s" | "status" => Command::Status,
        "clear-cache" => Command::ClearCache,
        "clear-position" => Command::ClearPosition,
        "clear-all" => Command::ClearAll,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

fn print_status<Y, P>(controller: &NarrationController<Y, P>)
where
    Y: Synthesizer + Clone + Send + 'static,
    P: PlaybackSurface,
{
    let state = if controller.is_playing() {
        "playing"
    } else if controller.is_waiting_for_next_paragraph() {
        "waiting for audio"
    } else {
        "paused"
    };
    match controller.current_paragraph_index() {
        Some(index) => println!(
            "{state} | paragraph {}/{} | {:.0}% of {:.1}s",
            index + 1,
            controller.paragraph_count(),
            controller.progress_percent(),
            controller.duration_seconds()
        ),
        None => println!("idle"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  p | play          toggle play/pause");
    println!("  f | forward       skip forward within the paragraph");
    println!("  b | back          skip backward within the paragraph");
    println!("  seek <percent>    scrub within the current paragraph");
    println!("  from <paragraph>  read from a paragraph number");
    println!("  s | status        show narration state");
    println!("  clear-cache       clear this book's cached audio and position");
    println!("  clear-position    clear this book's saved position");
    println!("  clear-all         clear every book's cached data");
    println!("  q | quit          save position and exit");
}

#[cfg(test)]
mod tests {
    use super::{Command, parse_command};

    #[test]
    fn parses_transport_commands() {
        assert!(matches!(parse_command("play"), Command::Toggle));
        assert!(matches!(parse_command("  p  "), Command::Toggle));
        assert!(matches!(parse_command("seek 50"), Command::Seek(p) if p == 50.0));
        assert!(matches!(parse_command("from 3"), Command::FromParagraph(3)));
        assert!(matches!(parse_command("q"), Command::Quit));
        assert!(matches!(parse_command(""), Command::Noop));
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(matches!(parse_command("seek fast"), Command::Unknown(_)));
        assert!(matches!(parse_command("from 0"), Command::Unknown(_)));
        assert!(matches!(parse_command("from"), Command::Unknown(_)));
    }
}
