use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use lexplan_core::{ExecutionMode, Msg};

/// Reads commands from stdin and turns them into messages. The reader thread
/// exits when stdin closes or the dispatch loop hangs up.
pub(crate) fn spawn_input_thread(msg_tx: mpsc::Sender<Msg>, shutdown: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            match parse_command(line.trim()) {
                Some(Command::Quit) => {
                    shutdown.store(true, Ordering::SeqCst);
                    let _ = msg_tx.send(Msg::NoOp);
                    break;
                }
                Some(Command::Msg(msg)) => {
                    if msg_tx.send(msg).is_err() {
                        break;
                    }
                }
                None => {
                    eprintln!("Unrecognized command. Type 'help' for a list.");
                }
            }
        }
    });
}

enum Command {
    Msg(Msg),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    if line.is_empty() {
        return Some(Command::Msg(Msg::NoOp));
    }
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let msg = match word {
        "query" => Msg::QueryChanged(rest.to_string()),
        "submit" => Msg::SubmitQuery,
        "queue" | "add" => Msg::AddToQueue,
        "decompose" => Msg::DecomposeQuery,
        "execute" => Msg::ExecutePlan,
        "plans" => Msg::GeneratePlans,
        "run-queue" => Msg::ExecuteQueue {
            notification_email: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
            terms_accepted: !rest.is_empty(),
        },
        "remove" => {
            if rest.is_empty() {
                return None;
            }
            Msg::RemoveTask {
                task_id: rest.to_string(),
            }
        }
        "mode" => match rest {
            "direct" => Msg::SetExecutionMode(ExecutionMode::Direct),
            "review" => Msg::SetExecutionMode(ExecutionMode::Review),
            _ => return None,
        },
        "notify" => Msg::SetNotificationPrefs {
            email: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
            terms_accepted: !rest.is_empty(),
        },
        "close-queue" => Msg::CloseQueue,
        "close" => Msg::CloseSession,
        "help" => {
            print_help();
            Msg::NoOp
        }
        "quit" | "exit" => return Some(Command::Quit),
        _ => return None,
    };
    Some(Command::Msg(msg))
}

fn print_help() {
    println!("Commands:");
    println!("  query <text>      set the analysis query");
    println!("  submit            create a plan for the current query");
    println!("  queue             add the current query to the queue");
    println!("  decompose         split the current query into sub-tasks");
    println!("  execute           execute the previewed plan");
    println!("  plans             generate plans for every queued task");
    println!("  run-queue [email] execute the whole queue");
    println!("  remove <id>       remove one queued task");
    println!("  mode direct|review  toggle execution chaining");
    println!("  notify [email]    set notification preferences");
    println!("  close-queue       leave the queue view");
    println!("  close             end the session and discard saved state");
    println!("  quit              exit without touching saved state");
}
