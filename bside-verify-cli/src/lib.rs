//! Terminal front end for the B Side wallet verification flow.
//!
//! Renders the verification view as text, forwards typed commands to the
//! verification machine and answers wallet prompts on the terminal.

pub mod approval;
pub mod clipboard;
pub mod console;

pub use approval::CliApprovalHandler;
pub use clipboard::Osc52Clipboard;
pub use console::{Command, Console};
