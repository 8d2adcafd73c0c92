//! Guidance server: one thread per connection, shared responder state.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use wf_channel::{GuidanceResponder, LocationBook, Reply, to_line};
use wf_core::{GuidanceConfig, RoutePlan, SessionId};
use wf_guidance::ProximityEngine;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register `plan` under `session` and serve until the process is killed.
pub fn run(
    config:     &GuidanceConfig,
    plan:       RoutePlan,
    session:    SessionId,
    bind:       &str,
    relay_bind: Option<&str>,
) -> Result<()> {
    let mut responder = GuidanceResponder::new(ProximityEngine::from_config(config));
    responder.start(session.clone(), plan)?;
    let responder = Arc::new(Mutex::new(responder));
    let book = Arc::new(Mutex::new(LocationBook::new()));

    if let Some(addr) = relay_bind {
        let listener = TcpListener::bind(addr).with_context(|| format!("binding relay on {addr}"))?;
        info!(address = addr, "location relay listening");
        let book = Arc::clone(&book);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let book = Arc::clone(&book);
                        thread::spawn(move || {
                            if let Err(e) = relay_connection(stream, &book) {
                                warn!(error = %e, "relay connection failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "relay accept failed"),
                }
            }
        });
    }

    let listener = TcpListener::bind(bind).with_context(|| format!("binding guidance on {bind}"))?;
    info!(address = bind, session = %session, "guidance server listening");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let responder = Arc::clone(&responder);
                let book = Arc::clone(&book);
                thread::spawn(move || {
                    if let Err(e) = guidance_connection(stream, &responder, &book) {
                        warn!(error = %e, "guidance connection failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    Ok(())
}

fn guidance_connection(
    stream:    TcpStream,
    responder: &Mutex<GuidanceResponder>,
    book:      &Mutex<LocationBook>,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let mut writer = stream.try_clone()?;
    let mut lines = BufReader::new(stream).lines();
    info!(%peer, "guidance connection opened");

    let Some(first) = lines.next().transpose()? else {
        return Ok(());
    };
    let (session, reply) = lock(responder).handshake(&first);
    let keep_open = write_reply(&mut writer, &reply)?;
    let Some(session) = session.filter(|_| keep_open) else {
        return Ok(());
    };
    // The relay's last fix is where this navigation request started from.
    match lock(book).latest(&session) {
        Some(origin) => {
            info!(session = %session.short(), origin = %origin.coordinate, "navigation origin from relay");
        }
        None => debug!(session = %session.short(), "no relayed origin for session"),
    }

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = lock(responder).on_location(&session, &line);
        if !write_reply(&mut writer, &reply)? {
            break;
        }
    }
    info!(%peer, session = %session.short(), "guidance connection closed");
    Ok(())
}

/// Write every update in `reply`.  `false` when the connection should close.
fn write_reply(writer: &mut TcpStream, reply: &Reply) -> Result<bool> {
    for update in &reply.updates {
        debug!(status = ?update.status, step = update.current_step, "→ update");
        writeln!(writer, "{}", to_line(update)?)?;
    }
    writer.flush()?;
    Ok(!reply.close)
}

fn relay_connection(stream: TcpStream, book: &Mutex<LocationBook>) -> Result<()> {
    let mut writer = stream.try_clone()?;
    for line in BufReader::new(stream).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let ack = lock(book).on_message(&line);
        debug!(received = ack.is_received(), "relay ack");
        writeln!(writer, "{}", to_line(&ack)?)?;
        writer.flush()?;
    }
    Ok(())
}
