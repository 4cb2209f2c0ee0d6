//! Console front end: a stdin/stdout REPL over the onboarding manager.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::error::WizardError;
use crate::onboarding::{OnboardingManager, OwnerPatch, OwnershipStatus, Step, StepInput};

const HELP: &str = "\
Commands:
  status                      Show the current step and profile summary
  submit-step <json>          Complete the current step with the given input
  back                        Go back one step
  goto <n>                    Jump back to step n
  owner add                   Add a beneficial owner
  owner remove <id>           Remove an owner
  owner set <id> <json>       Update owner fields
  scan <address>              Screen a wallet address (wallet step only)
  link <owner-id> <phone>     Text an owner a verification link
  verify <owner-id>           Verify an owner's identity
  upload <owner-id> <file>    Upload an owner's ID document
  submit                      Submit the application (review step only)
  reset                       Discard all progress
  help                        Show this message
  quit                        Exit";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    SubmitStep(Value),
    Back,
    Goto(Step),
    OwnerAdd,
    OwnerRemove(Uuid),
    OwnerSet(Uuid, OwnerPatch),
    Scan(String),
    SendLink(Uuid, String),
    Verify(Uuid),
    Upload(Uuid, String),
    Submit,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Type 'help' for a list of commands.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a valid owner id")]
    BadOwnerId(String),

    #[error("Step must be a number from 1 to 8, got '{0}'")]
    BadStep(String),

    #[error("Invalid JSON: {0}")]
    BadJson(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = split_word(line);

        match word {
            "status" => Ok(Self::Status),
            "submit-step" => Ok(Self::SubmitStep(parse_json(rest, "submit-step <json>")?)),
            "back" => Ok(Self::Back),
            "goto" => {
                let n = rest.parse::<u8>().ok().and_then(Step::from_number);
                n.map(Self::Goto)
                    .ok_or_else(|| ParseError::BadStep(rest.to_string()))
            }
            "owner" => {
                let (sub, rest) = split_word(rest);
                match sub {
                    "add" => Ok(Self::OwnerAdd),
                    "remove" => Ok(Self::OwnerRemove(parse_owner_id(rest)?)),
                    "set" => {
                        let (id, json) = split_word(rest);
                        let patch = serde_json::from_value(parse_json(json, "owner set <id> <json>")?)
                            .map_err(|e| ParseError::BadJson(e.to_string()))?;
                        Ok(Self::OwnerSet(parse_owner_id(id)?, patch))
                    }
                    _ => Err(ParseError::Usage("owner add | owner remove <id> | owner set <id> <json>")),
                }
            }
            "scan" if !rest.is_empty() => Ok(Self::Scan(rest.to_string())),
            "scan" => Err(ParseError::Usage("scan <address>")),
            "link" => {
                let (id, phone) = split_word(rest);
                if phone.is_empty() {
                    return Err(ParseError::Usage("link <owner-id> <phone>"));
                }
                Ok(Self::SendLink(parse_owner_id(id)?, phone.to_string()))
            }
            "verify" => Ok(Self::Verify(parse_owner_id(rest)?)),
            "upload" => {
                let (id, file) = split_word(rest);
                if file.is_empty() {
                    return Err(ParseError::Usage("upload <owner-id> <file>"));
                }
                Ok(Self::Upload(parse_owner_id(id)?, file.to_string()))
            }
            "submit" => Ok(Self::Submit),
            "reset" => Ok(Self::Reset),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "/quit" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

fn parse_json(raw: &str, usage: &'static str) -> Result<Value, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    serde_json::from_str(raw).map_err(|e| ParseError::BadJson(e.to_string()))
}

fn parse_owner_id(raw: &str) -> Result<Uuid, ParseError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ParseError::BadOwnerId(raw.to_string()))
}

/// Field errors get one line each; everything else prints its message.
pub fn render_error(err: &WizardError) -> String {
    match err {
        WizardError::Validation(errors) if !errors.is_empty() => {
            let mut out = String::from("Please fix the following:");
            for (field, message) in errors.iter() {
                let _ = write!(out, "\n  {field}: {message}");
            }
            out
        }
        other => other.to_string(),
    }
}

/// Drives an [`OnboardingManager`] from text commands.
pub struct Console {
    manager: Arc<OnboardingManager>,
}

impl Console {
    pub fn new(manager: Arc<OnboardingManager>) -> Self {
        Self { manager }
    }

    /// Run one command and return the text to show. Wizard errors are
    /// rendered, never propagated.
    pub async fn execute(&self, command: Command) -> String {
        match self.dispatch(command).await {
            Ok(text) => text,
            Err(e) => render_error(&e),
        }
    }

    async fn dispatch(&self, command: Command) -> Result<String, WizardError> {
        let m = &self.manager;
        match command {
            Command::Status => Ok(self.render_status().await),
            Command::SubmitStep(value) => {
                let profile = m.profile().await;
                let input = match StepInput::from_json(&profile, value) {
                    Ok(Some(input)) => input,
                    Ok(None) => return Ok("Nothing to fill in on the review step. Use 'submit'.".into()),
                    Err(e) => return Ok(format!("Invalid input for {}: {e}", profile.current_step.label())),
                };
                let outcome = m.advance(input).await?;
                let mut out = format!("Now on step {}: {}", outcome.step, outcome.step.label());
                for warning in outcome.warnings {
                    let _ = write!(out, "\nWarning: {warning}");
                }
                Ok(out)
            }
            Command::Back => {
                let step = m.retreat().await?;
                Ok(format!("Now on step {step}: {}", step.label()))
            }
            Command::Goto(step) => {
                let step = m.navigate_to(step).await?;
                Ok(format!("Now on step {step}: {}", step.label()))
            }
            Command::OwnerAdd => Ok(format!("Added owner {}", m.add_owner().await?)),
            Command::OwnerRemove(id) => {
                m.remove_owner(id).await?;
                Ok(format!("Removed owner {id}"))
            }
            Command::OwnerSet(id, patch) => {
                let owner = m.update_owner(id, patch).await?;
                Ok(format!(
                    "Updated owner {}: {} ({}%)",
                    owner.id,
                    owner.display_name(),
                    owner.ownership_percentage.normalize()
                ))
            }
            Command::Scan(address) => {
                let result = m.scan_wallet(&address).await?;
                let mut out = format!(
                    "Risk: {} (score {})\nReason: {}",
                    result.risk, result.score, result.reason
                );
                if let Some(flag) = &result.details.contextual_flag {
                    let _ = write!(out, "\nNote: {}", flag.message);
                }
                Ok(out)
            }
            Command::SendLink(id, phone) => {
                let link = m.send_verification_link(id, &phone).await?;
                Ok(format!("{}\nOr scan: {}", link.message, link.session.qr_url))
            }
            Command::Verify(id) => {
                let result = m.verify_owner(id).await?;
                Ok(format!("{} (confidence {}%)", result.message, result.confidence_score))
            }
            Command::Upload(id, file) => {
                let receipt = m.upload_owner_document(id, &file).await?;
                Ok(format!("Uploaded {} as {}", receipt.file_name, receipt.document_id))
            }
            Command::Submit => Ok(m.submit().await?.message),
            Command::Reset => {
                m.reset().await;
                Ok("Progress cleared. Starting over at step 1.".into())
            }
            Command::Help => Ok(HELP.into()),
            Command::Quit => Ok(String::new()),
        }
    }

    async fn render_status(&self) -> String {
        let status = self.manager.status().await;
        let profile = &status.profile;

        let mut out = format!(
            "Step {} of {}: {}",
            status.current_step, status.step_count, status.label
        );
        if let Some(ct) = profile.client_type {
            let _ = write!(out, "\nClient type: {ct}");
        }
        if status.submitted {
            let _ = write!(
                out,
                "\nSubmitted: {}",
                status.application_id.as_deref().unwrap_or("yes")
            );
        }

        let summary = match status.ownership {
            OwnershipStatus::Complete => "complete".to_string(),
            OwnershipStatus::Under { remaining } => format!("{}% unassigned", remaining.normalize()),
            OwnershipStatus::Over { excess } => format!("{}% over", excess.normalize()),
        };
        let _ = write!(
            out,
            "\nOwnership: {}% ({summary})",
            status.ownership_total.normalize()
        );
        for owner in &profile.ubo.owners {
            let name = owner.display_name();
            let _ = write!(
                out,
                "\n  {} {} {}%{}{}",
                owner.id,
                if name.is_empty() { "(unnamed)" } else { name.as_str() },
                owner.ownership_percentage.normalize(),
                if owner.verified { " verified" } else { "" },
                if owner.id_uploaded { " id-uploaded" } else { "" },
            );
        }

        if let Some(scan) = &profile.wallet.scan_result {
            let _ = write!(out, "\nWallet: {} ({} risk)", profile.wallet.address, scan.risk);
        }
        out
    }

    /// Read commands from stdin until EOF or `quit`.
    pub async fn run(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        println!("{}\n", self.render_status().await);
        eprint!("> ");

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        eprint!("> ");
                        continue;
                    }
                    match Command::parse(line) {
                        Ok(Command::Quit) => break,
                        Ok(command) => println!("\n{}\n", self.execute(command).await),
                        Err(e) => println!("\n{e}\n"),
                    }
                    eprint!("> ");
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}
