//! Interactive confirmation on the terminal.

use std::io::{self, BufRead, Write};

use mojifix_core::confirm::ConfirmationGate;
use mojifix_pipeline::run::Confirmer;
use tokio_util::sync::CancellationToken;

/// Reads one line from stdin per gate. Ctrl-C while waiting counts as a
/// refusal.
pub struct StdinConfirmer {
    cancel: CancellationToken,
}

impl StdinConfirmer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Confirmer for StdinConfirmer {
    async fn confirm(&mut self, gate: &ConfirmationGate) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let prompt = gate.prompt.clone();
        let read = tokio::task::spawn_blocking(move || read_answer(&prompt));

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            answer = read => answer.ok().flatten(),
        }
    }
}

/// `None` on end of input or a read error.
fn read_answer(prompt: &str) -> Option<String> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{prompt}: ").ok()?;
    stdout.flush().ok()?;
    drop(stdout);

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}
