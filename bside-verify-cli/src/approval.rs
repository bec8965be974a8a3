//! Interactive approval prompt.

use std::io::{self, Write};

use async_trait::async_trait;
use bside_verify::wallet::{ApprovalHandler, ApprovalRequest, ApprovalResponse};
use tracing::warn;

/// Asks the user on the terminal to approve each wallet request.
///
/// Waits for an answer indefinitely, like a wallet prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliApprovalHandler;

#[async_trait]
impl ApprovalHandler for CliApprovalHandler {
    async fn approve(&self, request: &ApprovalRequest) -> ApprovalResponse {
        let prompt = format!("\n[wallet] {}\nApprove? [y/N] ", request.description());

        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stdout = io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read approval answer");
                ApprovalResponse::Rejected
            }
            Err(err) => {
                warn!(error = %err, "approval prompt task failed");
                ApprovalResponse::Rejected
            }
        }
    }
}

/// Only an explicit yes approves.
#[must_use]
pub fn parse_answer(line: &str) -> ApprovalResponse {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalResponse::Approved,
        _ => ApprovalResponse::Rejected,
    }
}
