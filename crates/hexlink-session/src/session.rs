use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hexlink_transport::Connector;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::link::{LinkControl, LinkState};
use crate::listener::ListenerWorker;
use crate::message::{Request, SessionEvent};
use crate::sender::{Envelope, SenderWorker};
use crate::sink::RawSink;

/// Handle to a running session: one sender and one listener thread sharing a
/// link opened through a [`Connector`].
///
/// Requests go in through [`submit`](Self::submit); responses and device
/// traffic come out of [`events`](Self::events). The event channel closes
/// once both workers have stopped, after QUIT or [`shutdown`](Self::shutdown).
pub struct Session {
    inbox: SyncSender<Envelope>,
    events: Receiver<SessionEvent>,
    link: Arc<LinkControl>,
    sender: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session without a raw-byte sink.
    pub fn spawn<C: Connector>(connector: C, config: SessionConfig) -> Result<Self> {
        Self::spawn_with_sink(connector, config, None)
    }

    /// Start a session, mirroring every byte read from the link into `raw`.
    pub fn spawn_with_sink<C: Connector>(
        connector: C,
        config: SessionConfig,
        raw: Option<RawSink>,
    ) -> Result<Self> {
        config.validate()?;
        let link = Arc::new(LinkControl::new());
        let (inbox, inbox_rx) = mpsc::sync_channel(config.inbox_capacity.max(1));
        let (events_tx, events) = mpsc::channel();

        let listener = ListenerWorker::new(
            Arc::clone(&link),
            inbox.clone(),
            events_tx.clone(),
            raw,
            config.max_packet_size,
        );
        let sender = SenderWorker::new(connector, config, Arc::clone(&link), events_tx);

        let sender = std::thread::Builder::new()
            .name("hexlink-sender".into())
            .spawn(move || sender.run(inbox_rx))
            .map_err(SessionError::Spawn)?;

        let listener = match std::thread::Builder::new()
            .name("hexlink-listener".into())
            .spawn(move || listener.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                link.request_shutdown();
                let _ = inbox.send(Envelope::Shutdown);
                let _ = sender.join();
                return Err(SessionError::Spawn(err));
            }
        };

        info!("session started");
        Ok(Self {
            inbox,
            events,
            link,
            sender: Some(sender),
            listener: Some(listener),
        })
    }

    /// Queue a request for the sender worker.
    ///
    /// Every request accepted here gets exactly one response event. After QUIT
    /// has stopped the sender, requests are refused with `ChannelClosed`.
    pub fn submit(&self, request: impl Into<Request>) -> Result<()> {
        let request = request.into();
        self.link
            .admit(|| self.inbox.send(Envelope::Request(request)))
            .ok_or(SessionError::ChannelClosed)?
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Parse and queue one JSON request.
    pub fn submit_json(&self, text: &str) -> Result<()> {
        self.submit(Request::from_json(text)?)
    }

    /// The event stream.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Wait for the next event. `None` once the session has stopped.
    pub fn recv_event(&self) -> Option<SessionEvent> {
        self.events.recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<SessionEvent> {
        self.events.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SessionError::Timeout(timeout),
            RecvTimeoutError::Disconnected => SessionError::ChannelClosed,
        })
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// `false` once QUIT completed or shutdown was requested.
    pub fn is_running(&self) -> bool {
        !self.link.is_shutdown()
    }

    /// Join both workers without asking them to stop; returns after QUIT completes.
    pub fn wait(&mut self) {
        self.join_workers();
    }

    /// Stop both workers and release the link. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.sender.is_none() && self.listener.is_none() {
            return;
        }
        self.link.request_shutdown();
        let _ = self.inbox.send(Envelope::Shutdown);
        self.join_workers();
        info!("session stopped");
    }

    fn join_workers(&mut self) {
        if let Some(handle) = self.sender.take() {
            if handle.join().is_err() {
                warn!("sender worker panicked");
            }
        }
        if let Some(handle) = self.listener.take() {
            if handle.join().is_err() {
                warn!("listener worker panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
