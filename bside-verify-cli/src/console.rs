//! Interactive verification console.
//!
//! A small REPL over a [`VerificationMachine`]. Every command is forwarded to
//! the machine and the resulting view is rendered as text.

use std::io::{self, Write};
use std::time::Duration;

use bside_verify::view::{DISCLAIMER, VerificationView};
use bside_verify::{
    CopyOutcome, Phase, VerificationEvent, VerificationMachine, WalletError, recover_signer,
};
use tokio::sync::broadcast;
use tracing::debug;

/// How long `connect` waits for the wallet to expose an account.
const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// How long `sign` waits for the automatic copy to report.
const AUTO_COPY_WAIT: Duration = Duration::from_secs(1);

/// A console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Connect the wallet.
    Connect,
    /// Sign the challenge.
    Sign,
    /// Copy the signature to the clipboard.
    Copy,
    /// Disconnect the wallet.
    Disconnect,
    /// Show the current view.
    Status,
    /// Print the challenge text.
    Challenge,
    /// List commands.
    Help,
    /// Leave the console.
    Exit,
}

impl Command {
    /// Parse a typed command. Case-insensitive; surrounding whitespace is
    /// ignored.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let command = match input.trim().to_ascii_lowercase().as_str() {
            "connect" | "c" => Self::Connect,
            "sign" | "s" => Self::Sign,
            "copy" => Self::Copy,
            "disconnect" | "d" => Self::Disconnect,
            "status" | "" => Self::Status,
            "challenge" => Self::Challenge,
            "help" | "?" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            _ => return None,
        };
        Some(command)
    }
}

const HELP: &str = "\
commands:
  connect      connect the wallet
  sign         sign the verification message
  copy         copy the signature to the clipboard
  disconnect   disconnect the wallet
  status       show the current state
  challenge    show the message to be signed
  exit         quit";

/// Text console driving a verification machine.
#[derive(Debug)]
pub struct Console {
    machine: VerificationMachine,
}

impl Console {
    /// Wrap a started machine.
    #[must_use]
    pub const fn new(machine: VerificationMachine) -> Self {
        Self { machine }
    }

    /// The driven machine.
    #[must_use]
    pub const fn machine(&self) -> &VerificationMachine {
        &self.machine
    }

    /// Run the REPL until `exit` or end of input.
    pub async fn run(&self) -> io::Result<()> {
        let mut out = io::stdout();
        writeln!(out, "B Side wallet verification (type 'help' for commands)")?;
        writeln!(out)?;
        render(&self.machine.view(), &mut out)?;

        loop {
            write!(out, "> ")?;
            out.flush()?;

            let Some(line) = read_line().await? else {
                break;
            };

            let Some(command) = Command::parse(&line) else {
                writeln!(out, "unknown command: {}", line.trim())?;
                continue;
            };
            if command == Command::Exit {
                break;
            }

            let mut buf = Vec::new();
            self.execute(command, &mut buf).await?;
            out.write_all(&buf)?;
            writeln!(out)?;
        }

        self.machine.shutdown();
        Ok(())
    }

    /// Execute one command, writing its output to `out`.
    pub async fn execute(&self, command: Command, out: &mut impl Write) -> io::Result<()> {
        debug!(?command, phase = %self.machine.phase(), "console command");
        match command {
            Command::Connect => {
                if let Err(err) = self.machine.connect().await {
                    report(&err, out)?;
                    return Ok(());
                }
                let connected =
                    tokio::time::timeout(CONNECT_WAIT, self.machine.wait_for_phase(Phase::Verify))
                        .await;
                if connected.is_err() {
                    writeln!(out, "  The wallet has not exposed an account yet.")?;
                }
                render(&self.machine.view(), out)
            }
            Command::Sign => {
                let mut events = self.machine.subscribe();
                if let Err(err) = self.machine.sign().await {
                    report(&err, out)?;
                    return Ok(());
                }
                if let Some(outcome) = wait_auto_copy(&mut events).await {
                    debug!(?outcome, "automatic copy finished");
                }
                render(&self.machine.view(), out)
            }
            Command::Copy => {
                match self.machine.copy_signature().await {
                    Ok(()) => writeln!(out, "Signature copied to clipboard.")?,
                    Err(err) => writeln!(out, "copy failed: {err}. Copy the signature manually.")?,
                }
                Ok(())
            }
            Command::Disconnect => {
                self.machine.disconnect().await;
                render(&self.machine.view(), out)
            }
            Command::Status => {
                render(&self.machine.view(), out)?;
                if let Some(signature) = self.machine.signature() {
                    match recover_signer(self.machine.challenge(), &signature) {
                        Ok(signer) => writeln!(out, "  Signed by: {}", signer.to_checksum(None))?,
                        Err(err) => writeln!(out, "  Signer unknown: {err}")?,
                    }
                }
                Ok(())
            }
            Command::Challenge => writeln!(out, "{}", self.machine.challenge()),
            Command::Help => writeln!(out, "{HELP}"),
            Command::Exit => Ok(()),
        }
    }
}

/// Render `view` as text.
pub fn render(view: &VerificationView, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "  Wallet: {}", view.address_line())?;
    writeln!(out, "  {}", view.prompt)?;

    if let Some(signature) = &view.signature {
        writeln!(out, "  Signature: {signature}")?;
    }
    if let Some(hint) = view.copy_hint() {
        writeln!(out, "  {hint}")?;
    }
    if view.connecting {
        writeln!(out, "  Waiting for the wallet to connect...")?;
    }
    if view.signing {
        writeln!(out, "  Check your wallet to sign...")?;
    }
    if let Some(error) = &view.error {
        writeln!(out, "  ! {error}")?;
    }

    let actions = [
        ("connect", view.actions.can_connect),
        ("sign", view.actions.can_sign),
        ("copy", view.actions.can_copy),
        ("disconnect", view.actions.can_disconnect),
    ];
    let enabled: Vec<&str> = actions
        .iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| *name)
        .collect();
    writeln!(out, "  [{}]", enabled.join("] ["))?;
    writeln!(out, "  {DISCLAIMER}")
}

fn report(err: &WalletError, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "  ! {}", err.user_message())?;
    writeln!(out, "    ({err})")
}

async fn wait_auto_copy(events: &mut broadcast::Receiver<VerificationEvent>) -> Option<CopyOutcome> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(VerificationEvent::AutoCopy(outcome)) => return Some(outcome),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(AUTO_COPY_WAIT, wait).await.ok().flatten()
}

async fn read_line() -> io::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map(|read| (read > 0).then_some(line))
    })
    .await
    .map_err(io::Error::other)??;
    Ok(line)
}
