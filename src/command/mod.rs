//! Command execution: turns a parsed [`Command`] plus the current
//! [`SessionContext`] into a response and, where applicable, a state
//! transition or session-ending directive.
//!
//! Per §9's "exceptions-as-response" redesign, nothing here throws for an
//! ordinary protocol-level rejection (bad sequence, filter refusal, size
//! exceeded); those are all [`CommandOutcome::Reply`] or
//! [`CommandOutcome::Rejected`] values. Only a genuine transport/collaborator
//! failure becomes [`CommandOutcome::Fatal`].

use base64::Engine;
use tracing::{info, warn};

use crate::context::SessionContext;
use crate::error::SmtpError;
use crate::parser::{AuthMechanism, Command};
use crate::response::SmtpResponse;
use crate::state::State;
use crate::store::FilterResult;

/// The result of executing one parsed command.
pub enum CommandOutcome {
    /// The command succeeded: send `response`, let the state table's
    /// transition take effect, and reset the error-retry counter.
    Reply(SmtpResponse),
    /// The command parsed fine but was turned down by policy (a mailbox
    /// filter, a size or recipient-count limit, a failed AUTH attempt):
    /// send `response`, but leave the session's state and retry counter
    /// untouched, per §4.4's "successful parse, failed execute ⇒ keep
    /// state".
    Rejected(SmtpResponse),
    /// Send `response`, then close the connection (QUIT, or a fatal
    /// protocol violation the client should be told about first).
    ReplyAndClose(SmtpResponse),
    /// A transport or collaborator failure; the session loop logs this
    /// and tears the connection down without attempting a reply.
    Fatal(SmtpError),
    /// The handler already wrote everything the client needs (STARTTLS's
    /// `220` precedes the handshake itself); the session loop sends
    /// nothing further for this command, but still applies the
    /// transition and resets the retry counter.
    Handled,
}

impl From<FilterResult> for Option<SmtpResponse> {
    fn from(result: FilterResult) -> Self {
        match result {
            FilterResult::Yes => None,
            FilterResult::NoTemporarily(r) => Some(r.unwrap_or_else(|| SmtpResponse::new(450, "Mailbox unavailable"))),
            FilterResult::NoPermanently(r) => Some(r.unwrap_or_else(|| SmtpResponse::new(550, "Mailbox unavailable"))),
        }
    }
}

/// Executes `command` against `ctx`, returning the outcome and, on success,
/// the state the session should transition to (already computed by the
/// state table's `next_state` function by the caller; this module only
/// decides whether that transition should actually take effect).
pub async fn execute(ctx: &mut SessionContext, command: Command) -> CommandOutcome {
    match command {
        Command::Noop => CommandOutcome::Reply(SmtpResponse::ok()),
        Command::Quit => CommandOutcome::ReplyAndClose(SmtpResponse::new(221, "Bye")),
        Command::Rset => {
            ctx.reset_transaction();
            CommandOutcome::Reply(SmtpResponse::ok())
        }
        Command::Helo(domain) => {
            ctx.helo_domain = Some(domain.clone());
            ctx.transaction.reset();
            CommandOutcome::Reply(SmtpResponse::new(250, format!("{} greets {}", ctx.options.server_name, domain)))
        }
        Command::Ehlo(domain) => {
            ctx.helo_domain = Some(domain.clone());
            ctx.transaction.reset();
            CommandOutcome::Reply(ehlo_capabilities(ctx, &domain))
        }
        Command::Mail { from, params } => {
            ctx.transaction.reset();
            ctx.transaction.from = from.clone();
            for (key, value) in params {
                ctx.transaction.set_param(&key, value);
            }
            if let Some(declared_size) = declared_message_size(ctx) {
                if ctx.options.max_message_size > 0 && declared_size > ctx.options.max_message_size as u64 {
                    return CommandOutcome::Rejected(SmtpResponse::new(552, "Message size exceeds fixed maximum message size"));
                }
            }
            match ctx.filter.accept_from(from.as_ref(), &ctx.transaction).await {
                FilterResult::Yes => CommandOutcome::Reply(SmtpResponse::ok()),
                rejected => CommandOutcome::Rejected(Option::from(rejected).unwrap()),
            }
        }
        Command::Rcpt { to } => {
            if ctx.transaction.to.len() >= ctx.options.max_recipients {
                return CommandOutcome::Rejected(SmtpResponse::new(452, "Too many recipients"));
            }
            match ctx.filter.accept_recipient(&to).await {
                FilterResult::Yes => {
                    ctx.transaction.to.push(to);
                    CommandOutcome::Reply(SmtpResponse::ok())
                }
                rejected => CommandOutcome::Rejected(Option::from(rejected).unwrap()),
            }
        }
        Command::Data => execute_data(ctx).await,
        Command::StartTls => execute_starttls(ctx).await,
        Command::Auth { mechanism, initial_response } => execute_auth(ctx, mechanism, initial_response).await,
        Command::Dbug => CommandOutcome::Reply(SmtpResponse::command_not_implemented()),
        Command::Vrfy(_) => CommandOutcome::Reply(SmtpResponse::new(252, "Cannot VRFY user, but will accept message")),
        Command::Expn(_) => CommandOutcome::Reply(SmtpResponse::command_not_implemented()),
        Command::Help(_) => CommandOutcome::Reply(SmtpResponse::new(214, "See RFC 5321")),
    }
}

/// Order matches §6: `SIZE`, `STARTTLS`, `AUTH`, `8BITMIME`, `PIPELINING`.
fn ehlo_capabilities(ctx: &SessionContext, domain: &str) -> SmtpResponse {
    let mut lines = vec![format!("{} greets {}", ctx.options.server_name, domain)];
    if ctx.options.max_message_size > 0 {
        lines.push(format!("SIZE {}", ctx.options.max_message_size));
    }
    if ctx.endpoint.tls_config.is_some() && !ctx.network.is_secure {
        lines.push("STARTTLS".to_string());
    }
    if !ctx.options.supported_authentication_methods.is_empty()
        && (ctx.network.is_secure || ctx.endpoint.allow_unsecure_authentication)
    {
        let mechanisms: Vec<&str> = ctx.options.supported_authentication_methods.iter().map(|m| m.as_str()).collect();
        lines.push(format!("AUTH {}", mechanisms.join(" ")));
    }
    lines.push("8BITMIME".to_string());
    lines.push("PIPELINING".to_string());
    SmtpResponse::multiline(250, lines)
}

/// Reads the `SIZE=` ESMTP parameter off `MAIL FROM`, if present and
/// well-formed, so it can be checked against `maxMessageSize` before the
/// filter runs.
fn declared_message_size(ctx: &SessionContext) -> Option<u64> {
    ctx.transaction.param("SIZE").and_then(|v| v.parse().ok())
}

async fn execute_data(ctx: &mut SessionContext) -> CommandOutcome {
    if let Err(e) = ctx.network.write_response(&SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>").to_wire()).await {
        return CommandOutcome::Fatal(e);
    }
    let max_size = if ctx.options.max_message_size == 0 { usize::MAX } else { ctx.options.max_message_size };
    let body = match ctx.network.read_data_body(max_size).await {
        Ok(body) => body,
        Err(e) => return CommandOutcome::Fatal(e),
    };
    if body.size_exceeded {
        ctx.transaction.reset();
        return CommandOutcome::Reply(SmtpResponse::new(552, "Message size exceeds fixed maximum message size"));
    }
    ctx.transaction.message_bytes = body.bytes;

    let response = match ctx.store.save(&ctx.transaction).await {
        Ok(Some(response)) => response,
        Ok(None) => SmtpResponse::ok(),
        Err(reason) => {
            warn!(%reason, connection_id = ctx.connection_id, "message store rejected the transaction");
            SmtpResponse::new(451, "Requested action aborted: local error in processing")
        }
    };
    info!(connection_id = ctx.connection_id, recipients = ctx.transaction.to.len(), "message accepted");
    ctx.transaction.reset();
    CommandOutcome::Reply(response)
}

async fn execute_starttls(ctx: &mut SessionContext) -> CommandOutcome {
    let Some(config) = ctx.endpoint.tls_config.clone() else {
        return CommandOutcome::Rejected(SmtpResponse::command_not_implemented());
    };
    if ctx.network.is_secure {
        return CommandOutcome::Rejected(SmtpResponse::new(503, "Connection already secure"));
    }
    if let Err(e) = ctx.network.write_response(&SmtpResponse::new(220, "Ready to start TLS").to_wire()).await {
        return CommandOutcome::Fatal(e);
    }
    match crate::tls::upgrade(&mut ctx.network, config).await {
        Ok(()) => {
            ctx.state = State::Initialized;
            ctx.helo_domain = None;
            ctx.transaction.reset();
            CommandOutcome::Handled
        }
        Err(e) => CommandOutcome::Fatal(e),
    }
}

async fn execute_auth(ctx: &mut SessionContext, mechanism: AuthMechanism, initial_response: Option<String>) -> CommandOutcome {
    if !ctx.network.is_secure && !ctx.endpoint.allow_unsecure_authentication {
        return CommandOutcome::Rejected(SmtpResponse::new(538, "Encryption required for requested authentication mechanism"));
    }
    if !ctx.options.supported_authentication_methods.contains(&mechanism) {
        return CommandOutcome::Rejected(SmtpResponse::new(504, "Unrecognized authentication mechanism"));
    }
    if ctx.authenticator.is_none() {
        return CommandOutcome::Rejected(SmtpResponse::command_not_implemented());
    }

    let outcome = match mechanism {
        AuthMechanism::Plain => {
            let encoded = match initial_response {
                Some(r) => r,
                None => match prompt_for_line(ctx, "").await {
                    Ok(line) => line,
                    Err(e) => return CommandOutcome::Fatal(e),
                },
            };
            let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes()) else {
                return CommandOutcome::Rejected(SmtpResponse::syntax_error_in_parameters());
            };
            let fields: Vec<&[u8]> = decoded.split(|b| *b == 0).collect();
            if fields.len() != 3 {
                return CommandOutcome::Rejected(SmtpResponse::syntax_error_in_parameters());
            }
            let authorization_id = std::str::from_utf8(fields[0]).ok().filter(|s| !s.is_empty());
            let (Ok(authentication_id), Ok(password)) = (std::str::from_utf8(fields[1]), std::str::from_utf8(fields[2])) else {
                return CommandOutcome::Rejected(SmtpResponse::syntax_error_in_parameters());
            };
            let authenticator = ctx.authenticator.as_mut().expect("checked above");
            let result = authenticator.authenticate_plain(authorization_id, authentication_id, password).await;
            (result, authentication_id.to_string())
        }
        AuthMechanism::Login => {
            let username_b64 = match prompt_for_line(ctx, "VXNlcm5hbWU6").await {
                Ok(line) => line,
                Err(e) => return CommandOutcome::Fatal(e),
            };
            let password_b64 = match prompt_for_line(ctx, "UGFzc3dvcmQ6").await {
                Ok(line) => line,
                Err(e) => return CommandOutcome::Fatal(e),
            };
            let (Ok(username_bytes), Ok(password_bytes)) = (
                base64::engine::general_purpose::STANDARD.decode(username_b64.as_bytes()),
                base64::engine::general_purpose::STANDARD.decode(password_b64.as_bytes()),
            ) else {
                return CommandOutcome::Rejected(SmtpResponse::syntax_error_in_parameters());
            };
            let (Ok(username), Ok(password)) = (String::from_utf8(username_bytes), String::from_utf8(password_bytes)) else {
                return CommandOutcome::Rejected(SmtpResponse::syntax_error_in_parameters());
            };
            let authenticator = ctx.authenticator.as_mut().expect("checked above");
            let result = authenticator.authenticate_login(&username, &password).await;
            (result, username)
        }
    };

    match outcome.0 {
        FilterResult::Yes => {
            ctx.authenticated_user = Some(outcome.1);
            ctx.authentication_attempts = 0;
            CommandOutcome::Reply(SmtpResponse::new(235, "Authentication successful"))
        }
        rejected => {
            ctx.authentication_attempts += 1;
            if ctx.authentication_attempts >= ctx.options.max_authentication_attempts {
                CommandOutcome::ReplyAndClose(SmtpResponse::new(535, "Authentication failed, too many invalid attempts"))
            } else {
                let reply = Option::from(rejected).unwrap_or_else(|| SmtpResponse::new(535, "Authentication failed"));
                CommandOutcome::Rejected(reply)
            }
        }
    }
}

/// Sends a `334` continuation prompt and reads the client's base64 reply
/// line, used by AUTH LOGIN's two-step challenge and AUTH PLAIN without an
/// initial response.
async fn prompt_for_line(ctx: &mut SessionContext, prompt: &str) -> Result<String, SmtpError> {
    ctx.network.write_response(&format!("334 {prompt}\r\n")).await?;
    match ctx.network.read_line().await? {
        crate::session::io::ReadLineOutcome::Line(line) => Ok(line),
        _ => Err(SmtpError::Protocol("expected AUTH continuation line".into())),
    }
}
