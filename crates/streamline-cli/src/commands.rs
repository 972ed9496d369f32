//! Subcommand implementations.

use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use streamline_core::{
    ApiStreamAdapter, ChatRequest, DecoderKind, EventNotifier, HttpApiClient, Message,
    SessionHandle, StreamBus, StreamCallbacks, StreamError, StreamEvent,
    StreamResponse, StreamSession, StreamlineConfig,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{ChatArgs, ReplayArgs};
use crate::helpers::event_line;

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

pub async fn cmd_chat(config: &StreamlineConfig, args: ChatArgs) -> Result<()> {
    let client = HttpApiClient::from_config(config).context("failed to create HTTP client")?;
    let bus = StreamBus::new(config.stream.bus_capacity);
    let printer = args.events.then(|| spawn_event_printer(bus.subscribe()));

    let adapter = ApiStreamAdapter::wrap(client)
        .with_notifier(EventNotifier::new(Arc::new(bus.clone())))
        .with_decoder(config.stream.decoder.build());

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt));

    let mut request = ChatRequest::new(messages).streaming(!args.no_stream);
    if let Some(model) = args.model {
        request = request.with_model(model);
    }

    let model = if request.model.is_empty() {
        adapter.client().default_model()
    } else {
        request.model.as_str()
    };
    let session = adapter.session();
    let handle = session.handle();
    info!(session_id = %handle.id(), model = %model, "starting chat");

    let watchdog = spawn_abort_watchdog(handle, args.timeout.map(Duration::from_secs));

    let callbacks = StreamCallbacks::new().on_chunk(|text| {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not fail the stream.
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    });
    let result = adapter.stream_call_with(session, &request, callbacks).await;
    watchdog.abort();
    println!();

    // Close the bus so the printer drains and exits.
    drop(adapter);
    drop(bus);
    if let Some(printer) = printer {
        printer.await.context("event printer task failed")?;
    }

    match result {
        Ok(_) => Ok(()),
        Err(StreamError::Aborted { partial_text }) => {
            eprintln!("stream aborted after {} bytes", partial_text.len());
            Ok(())
        }
        Err(e) => Err(e).context("chat request failed"),
    }
}

/// Abort `handle` on Ctrl-C or when `timeout` elapses.
fn spawn_abort_watchdog(handle: SessionHandle, timeout: Option<Duration>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("interrupt received; aborting stream"),
            () = deadline => warn!(timeout = ?timeout, "timeout reached; aborting stream"),
        }
        handle.abort();
    })
}

/// Print bus events to stderr until the session settles or the bus closes.
fn spawn_event_printer(mut rx: broadcast::Receiver<Arc<StreamEvent>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match event_line(&event) {
                        Ok(line) => eprintln!("{line}"),
                        Err(e) => warn!(error = %e, "failed to render event"),
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Subcommand: replay
// ---------------------------------------------------------------------------

pub async fn cmd_replay(config: &StreamlineConfig, args: ReplayArgs) -> Result<()> {
    if args.chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }

    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let decoder = if args.plain {
        DecoderKind::Plain.build()
    } else {
        config.stream.decoder.build()
    };

    let fragments = split_fragments(&data, args.chunk_size);
    info!(
        file = %args.file.display(),
        bytes = data.len(),
        fragments = fragments.len(),
        "replaying captured body"
    );

    let session = StreamSession::new(EventNotifier::silent(), decoder);
    let mut index = 0usize;
    let callbacks = StreamCallbacks::new().on_chunk(|text| {
        index += 1;
        println!("{index:>4} {text:?}");
    });

    let outcome = session
        .stream_response(
            move || async move {
                Ok(StreamResponse::from_byte_stream(futures::stream::iter(
                    fragments,
                )))
            },
            callbacks,
        )
        .await;

    let text = outcome.into_result().context("replay failed")?;
    eprintln!("{index} chunks, {} bytes of text", text.len());
    Ok(())
}

fn split_fragments(data: &[u8], chunk_size: usize) -> Vec<std::result::Result<Bytes, Infallible>> {
    data.chunks(chunk_size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

pub fn cmd_config(config: &StreamlineConfig, source: Option<&Path>, path_only: bool) -> Result<()> {
    if path_only {
        match source {
            Some(path) => println!("{}", path.display()),
            None => println!("<defaults>"),
        }
        return Ok(());
    }

    let rendered = config
        .redacted()
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
