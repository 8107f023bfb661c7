//! TCP transport: newline-delimited JSON frames over plain TCP connections.
//!
//! The listening side runs on tokio and hands every decoded request to the registered processor
//! on the blocking pool, since ring operations block while they wait on other members. The
//! sending side is a short-lived blocking connection per request, bounded by the caller's
//! timeout on connect, write and read.

use crate::core::{Address, IrrevocableContext};
use crate::error::ChordError;
use crate::network::codec::{self, MAX_FRAME_BYTES};
use crate::network::{Message, MessageProcessor, Network, Payload};
use anyhow::{anyhow, Context};
use std::io::{BufRead, Read, Write};
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::Span;

pub struct TcpNetwork {
    address: Address,
    listener: Arc<Mutex<Option<TcpListener>>>,
    processor: Arc<Mutex<Option<MessageProcessor>>>,
    span: Span,
}

impl TcpNetwork {
    /// Binds a listener on `address`. Port 0 picks a free port; `local_address` reports the port
    /// actually bound.
    pub async fn bind(parent_span: &Span, address: Address) -> anyhow::Result<TcpNetwork> {
        let listener = TcpListener::bind(address.to_string())
            .await
            .with_context(|| format!("failed to bind {}", address))?;
        let bound = listener
            .local_addr()
            .context("failed to read the bound address")?;
        let address = Address::new(address.host(), &bound.port().to_string());

        let span = tracing::span!(
            parent: parent_span,
            tracing::Level::TRACE,
            "tcp_network",
            address = %address
        );
        {
            let _enter = span.enter();
            tracing::debug!("listening on {}", bound);
        }

        Ok(TcpNetwork {
            address,
            listener: Arc::new(Mutex::new(Some(listener))),
            processor: Arc::new(Mutex::new(None)),
            span,
        })
    }

    /// Reports `address` instead of the bound one as this network's address, for a listener on
    /// an address other members cannot reach (such as `0.0.0.0`). Requests sent from this
    /// network carry it as their sender.
    pub fn advertise(mut self, address: Address) -> TcpNetwork {
        {
            let _enter = self.span.enter();
            tracing::debug!("advertising {} for listener {}", address, self.address);
        }
        self.address = address;
        self
    }

    /// Accepts connections until `ctx` is cancelled. Each connection is served on its own task.
    /// Fails if the listener is already being served.
    pub async fn serve(&self, ctx: IrrevocableContext) -> anyhow::Result<()> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| anyhow!("failed to acquire lock on listener"))?
            .take()
            .ok_or_else(|| anyhow!("{} is already being served", self.address))?;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let connection = self.clone();
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = connection.handle_connection(&ctx, stream).await {
                                let _enter = connection.span.enter();
                                tracing::debug!("connection from {} closed: {:#}", remote, e);
                            }
                        });
                    }
                    Err(e) => {
                        let _enter = self.span.enter();
                        tracing::warn!("failed to accept connection: {}", e);
                    }
                },
            }
        }

        let _enter = self.span.enter();
        tracing::debug!("stopped serving {}", self.address);
        Ok(())
    }

    /// Answers every frame of one connection in order, until the peer hangs up or `ctx` is
    /// cancelled. An undecodable frame is answered with a `Failure`; an oversized one also
    /// closes the connection since the framing can no longer be trusted.
    async fn handle_connection(
        &self,
        ctx: &IrrevocableContext,
        stream: TcpStream,
    ) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            let mut frame = Vec::new();
            let mut limited = (&mut reader).take(MAX_FRAME_BYTES as u64 + 1);
            let read = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                read = limited.read_until(b'\n', &mut frame) => {
                    read.context("failed to read frame")?
                }
            };
            if read == 0 {
                return Ok(());
            }

            let oversized = frame.len() > MAX_FRAME_BYTES;
            let reply = match codec::decode(&frame) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    let _enter = self.span.enter();
                    tracing::warn!("dropping undecodable frame: {}", e);
                    Message::new(Payload::Failure(e), self.address)
                }
            };

            writer
                .write_all(&codec::encode(&reply)?)
                .await
                .context("failed to write reply")?;
            if oversized {
                return Ok(());
            }
        }
    }

    /// Runs the registered processor on a request and turns any failure into a `Failure` reply.
    async fn dispatch(&self, request: Message) -> Message {
        let processor = match self.processor.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(processor) = processor else {
            return Message::new(
                Payload::Failure(ChordError::unreachable(
                    self.address,
                    "no message processor registered",
                )),
                self.address,
            );
        };

        let kind = request.payload.kind();
        let outcome =
            tokio::task::spawn_blocking(move || processor.process_incoming_message(request)).await;

        let failure = match outcome {
            Ok(Ok(reply)) => return reply,
            Ok(Err(e)) => ChordError::classify(&e)
                .unwrap_or_else(|| ChordError::MalformedMessage(format!("{:#}", e))),
            Err(e) => {
                let _enter = self.span.enter();
                tracing::error!("processing {} panicked: {}", kind, e);
                ChordError::MalformedMessage(format!("processing {} failed", kind))
            }
        };
        Message::new(Payload::Failure(failure), self.address)
    }
}

impl Clone for TcpNetwork {
    fn clone(&self) -> Self {
        TcpNetwork {
            address: self.address,
            listener: Arc::clone(&self.listener),
            processor: Arc::clone(&self.processor),
            span: self.span.clone(),
        }
    }
}

impl Network for TcpNetwork {
    /// Opens a connection to `target`, writes one frame and waits for the reply frame. Connect,
    /// write and read are each bounded by `timeout`.
    fn send_message(
        &self,
        target: &Address,
        message: Message,
        timeout: Duration,
    ) -> anyhow::Result<Message> {
        let socket = target
            .to_string()
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}", target))?
            .next()
            .ok_or_else(|| anyhow!("{} resolved to no address", target))?;

        let mut stream = std::net::TcpStream::connect_timeout(&socket, timeout)
            .with_context(|| format!("failed to connect to {}", target))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        stream
            .write_all(&codec::encode(&message)?)
            .with_context(|| format!("failed to send {} to {}", message.payload.kind(), target))?;

        let mut reader = std::io::BufReader::new(stream.take(MAX_FRAME_BYTES as u64 + 1));
        let mut frame = Vec::new();
        reader
            .read_until(b'\n', &mut frame)
            .with_context(|| format!("failed to read reply from {}", target))?;
        if frame.is_empty() {
            return Err(anyhow!("{} closed the connection without replying", target));
        }

        Ok(codec::decode(&frame)?)
    }

    fn register_processor(&self, processor: MessageProcessor) -> anyhow::Result<()> {
        let mut slot = self
            .processor
            .lock()
            .map_err(|_| anyhow!("failed to acquire lock on processor container"))?;
        match slot.as_ref() {
            Some(_) => Err(anyhow!("a message processor is already registered")),
            None => {
                *slot = Some(processor);
                Ok(())
            }
        }
    }

    fn local_address(&self) -> Address {
        self.address
    }

    fn clone_box(&self) -> Box<dyn Network> {
        Box::new(self.clone())
    }
}
