//! The per-connection session loop: banner, read-parse-execute-respond,
//! repeated until QUIT, a fatal error, too many bad commands, or
//! cancellation, per §4.5.

pub mod io;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{self, CommandOutcome};
use crate::context::SessionContext;
use crate::parser::{leading_keyword, Tokenizer};
use crate::response::SmtpResponse;
use crate::state::{self, State};
use io::ReadLineOutcome;

/// Drives one accepted connection to completion. Never returns an `Err`
/// for ordinary protocol violations — only for a transport failure the
/// caller should log and count against the endpoint.
pub async fn run(mut ctx: SessionContext, cancellation: CancellationToken) -> Result<(), crate::error::SmtpError> {
    if ctx.endpoint.trust_proxy_protocol {
        match read_line_or_cancel(&mut ctx, &cancellation).await? {
            Some(ReadLineOutcome::Line(line)) => match crate::proxy::parse_line(&line) {
                Some(Ok(proxied)) => {
                    debug!(connection_id = ctx.connection_id, source = %proxied.source, "accepted PROXY header");
                    ctx.remote_endpoint = proxied.source;
                }
                Some(Err(reason)) => {
                    warn!(connection_id = ctx.connection_id, %reason, "malformed PROXY header, closing silently");
                    return Ok(());
                }
                None => {
                    warn!(connection_id = ctx.connection_id, "endpoint requires PROXY header but none was sent");
                    return Ok(());
                }
            },
            _ => return Ok(()),
        }
    }

    let greeting = SmtpResponse::new(220, format!("{} ESMTP ready", ctx.options.server_name));
    ctx.network.write_response(&greeting.to_wire()).await?;

    loop {
        let line = match read_line_or_cancel(&mut ctx, &cancellation).await? {
            Some(ReadLineOutcome::Line(line)) => line,
            Some(ReadLineOutcome::TooLong) => {
                ctx.network.write_response(&SmtpResponse::line_too_long().to_wire()).await?;
                if ctx.register_error() {
                    ctx.network.write_response(&SmtpResponse::too_many_errors().to_wire()).await?;
                    return Ok(());
                }
                continue;
            }
            Some(ReadLineOutcome::Eof) | None => {
                info!(connection_id = ctx.connection_id, "connection closed by peer");
                return Ok(());
            }
        };

        let keyword = leading_keyword(&line);
        let Some((parse, next_state)) = state::lookup(ctx.state, &keyword) else {
            let response = if keyword.is_empty() {
                SmtpResponse::syntax_error()
            } else {
                SmtpResponse::bad_sequence(&state::valid_keywords(ctx.state))
            };
            ctx.network.write_response(&response.to_wire()).await?;
            if ctx.register_error() {
                ctx.network.write_response(&SmtpResponse::too_many_errors().to_wire()).await?;
                return Ok(());
            }
            continue;
        };

        let mut tokenizer = Tokenizer::new(&line);
        let command = match parse(&mut tokenizer) {
            Ok(command) => command,
            Err(syntax_error) => {
                debug!(connection_id = ctx.connection_id, error = %syntax_error, "syntax error");
                ctx.network.write_response(&SmtpResponse::syntax_error_in_parameters().to_wire()).await?;
                if ctx.register_error() {
                    ctx.network.write_response(&SmtpResponse::too_many_errors().to_wire()).await?;
                    return Ok(());
                }
                continue;
            }
        };

        ctx.options.events.command_executing(ctx.connection_id, &keyword).await;
        match command::execute(&mut ctx, command).await {
            CommandOutcome::Reply(response) => {
                ctx.network.write_response(&response.to_wire()).await?;
                ctx.state = next_state(ctx.state);
                ctx.record_success();
            }
            CommandOutcome::Rejected(response) => {
                // Successful parse, failed execute: the response goes out
                // but state and the retry counter are left exactly as they
                // were, per §4.4.
                ctx.network.write_response(&response.to_wire()).await?;
            }
            CommandOutcome::Handled => {
                ctx.state = next_state(ctx.state);
                ctx.record_success();
            }
            CommandOutcome::ReplyAndClose(response) => {
                ctx.network.write_response(&response.to_wire()).await?;
                return Ok(());
            }
            CommandOutcome::Fatal(e) => return Err(e),
        }

        if ctx.state == State::None {
            // Never reachable via the table, but guards against a future
            // `next_state` regression silently wedging the session.
            ctx.state = State::Initialized;
        }
    }
}

async fn read_line_or_cancel(
    ctx: &mut SessionContext,
    cancellation: &CancellationToken,
) -> Result<Option<ReadLineOutcome>, crate::error::SmtpError> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Ok(None),
        result = tokio::time::timeout(ctx.options.command_wait_timeout, ctx.network.read_line()) => {
            match result {
                Ok(inner) => inner.map(Some),
                Err(_) => {
                    ctx.network.write_response(&SmtpResponse::timeout().to_wire()).await?;
                    Ok(None)
                }
            }
        }
    }
}
