//! Operator console: one command per input line, run as the console actor.

use bulwark_api::{ActorContext, CommandRegistry, DispatchOutcome, ServerState};
use std::io::BufRead;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Reads stdin on a dedicated thread. A blocking read cannot be cancelled,
/// so the thread is left to die with the process; the channel closes on EOF.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Console input error: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Console input unavailable: {}", e);
    }
    rx
}

/// Dispatches every received line until the channel closes, writing the
/// outcome to `output`. Returns the number of lines dispatched.
pub async fn run_console<W>(
    registry: Arc<CommandRegistry>,
    server_state: ServerState,
    mut lines: mpsc::Receiver<String>,
    mut output: W,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let console = ActorContext::console(server_state);
    let mut dispatched = 0;

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        dispatched += 1;

        let outcome = registry.dispatch_line(&console, line);
        debug!("console> {} => {:?}", line, outcome);
        if let Some(text) = render(&outcome) {
            output.write_all(text.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
    }

    Ok(dispatched)
}

fn render(outcome: &DispatchOutcome) -> Option<String> {
    match outcome {
        DispatchOutcome::Dispatched { replies, .. } if replies.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_api::{AllowedServerState, CommandDefinition, GroupStore};

    fn registry() -> Arc<CommandRegistry> {
        let registry = CommandRegistry::new(Arc::new(GroupStore::default()));
        registry
            .register(CommandDefinition::new(["echo"], |inv| {
                inv.reply(inv.args.join(" "));
                Ok(())
            }))
            .unwrap();
        registry
            .register(CommandDefinition::new(["save"], |_| Ok(())))
            .unwrap();
        registry
            .register(
                CommandDefinition::new(["kick"], |_| Ok(()))
                    .allowed_server_state(AllowedServerState::Multiplayer),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn feed(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send(line.to_string()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_lines_are_dispatched_until_closed() {
        let lines = feed(&["echo \"hello there\" friend", "", "   ", "save", "warp home"]);
        let mut output = Vec::new();

        let count = run_console(registry(), ServerState::Multiplayer, lines, &mut output)
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "hello there friend\nUnknown command\n"
        );
    }

    #[tokio::test]
    async fn test_rejections_are_reported() {
        let lines = feed(&["kick someone"]);
        let mut output = Vec::new();

        run_console(registry(), ServerState::Singleplayer, lines, &mut output)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "This command cannot be used in the current server mode\n"
        );
    }
}
