//! Hand-off of a composed alert to the messaging app via an `sms:` URL.

use std::io;
use std::process::{ExitStatus, Stdio};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::model::AlertPayload;
use crate::platform::{CommandExec, SmsDispatcher};

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// `sms:<n1>,<n2>?body=<encoded message>`
pub fn sms_url(payload: &AlertPayload) -> String {
    format!(
        "sms:{}?body={}",
        payload.recipients.join(","),
        encode_uri_component(&payload.message)
    )
}

/// Opens the `sms:` URL with an external handler (the desktop opener by default).
/// A configured handler that is not installed gives way to `fallback`.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    command: CommandExec,
    fallback: Option<CommandExec>,
}

impl CommandDispatcher {
    pub fn new(command: CommandExec) -> Self {
        Self {
            command,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: CommandExec) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

async fn run_handler(handler: &CommandExec, url: &str) -> io::Result<ExitStatus> {
    handler
        .to_tokio()
        .arg(url)
        .stdin(Stdio::null())
        .status()
        .await
}

impl SmsDispatcher for CommandDispatcher {
    async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let url = sms_url(payload);
        let mut handler = &self.command;
        let mut result = run_handler(handler, &url).await;

        let not_installed = matches!(&result, Err(err) if err.kind() == io::ErrorKind::NotFound);
        if let (true, Some(fallback)) = (not_installed, &self.fallback) {
            warn!(
                handler = %handler.program,
                fallback = %fallback.program,
                "SMS handler not installed; trying the system opener"
            );
            handler = fallback;
            result = run_handler(handler, &url).await;
        }

        let status = result.map_err(|err| spawn_error(&handler.program, err))?;
        if !status.success() {
            return Err(DispatchError::Unavailable(format!(
                "`{}` exited with {}",
                handler.program, status
            )));
        }
        info!(
            recipients = payload.recipients.len(),
            handler = %handler.program,
            "alert handed to SMS handler"
        );
        Ok(())
    }
}

fn spawn_error(program: &str, err: io::Error) -> DispatchError {
    match err.kind() {
        io::ErrorKind::NotFound => {
            DispatchError::Unavailable(format!("no SMS handler `{}` installed", program))
        }
        _ => DispatchError::Unavailable(format!("failed to run `{}`: {}", program, err)),
    }
}

/// Prints the URL on stdout instead of opening it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintDispatcher;

impl SmsDispatcher for PrintDispatcher {
    async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        println!("{}", sms_url(payload));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SmsHandler {
    Command(CommandDispatcher),
    Print(PrintDispatcher),
}

impl SmsDispatcher for SmsHandler {
    async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        match self {
            SmsHandler::Command(dispatcher) => dispatcher.dispatch_sms(payload).await,
            SmsHandler::Print(dispatcher) => dispatcher.dispatch_sms(payload).await,
        }
    }
}
