//! nng REQ/REP front end.
//!
//! A pool of contexts shares one socket. Each context owns an `Aio` whose
//! callback receives a request, hands it to the [`MessageHandler`] and sends
//! the reply, then re-arms itself for the next receive.

pub mod wire;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use nng::{Aio, AioResult, Context, Message, Protocol, Socket};
use tracing::{debug, info, warn};

use crate::error::TransportError;

pub use wire::{ClientMessage, Envelope, HolisticLandmarks, MessageHandler, Reply, SimpleLandmarks};

pub const DEFAULT_ADDRESS: &str = "tcp://127.0.0.1:54321";

const TICK: Duration = Duration::from_millis(100);

struct Worker {
    id: usize,
    handler: Arc<MessageHandler>,
    /// Session whose reply is in flight.
    pending: Mutex<Option<String>>,
}

impl Worker {
    fn set_pending(&self, session: Option<String>) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn take_pending(&self) -> Option<String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// A reply could not be delivered, so the connection is gone.
    fn send_failed(&self, err: nng::Error) {
        match self.take_pending() {
            Some(session) => {
                warn!(worker = self.id, session = %session, %err, "reply failed, dropping session");
                self.handler.registry().disconnect(&session);
            }
            None => warn!(worker = self.id, %err, "reply failed"),
        }
    }
}

pub struct Server {
    // Dropped before the socket so no callback outlives it.
    workers: Vec<(Aio, Context)>,
    socket: Socket,
    handler: Arc<MessageHandler>,
    address: String,
}

impl Server {
    /// Listen on `address` with `workers` concurrent contexts.
    pub fn bind(
        address: &str,
        workers: usize,
        handler: Arc<MessageHandler>,
    ) -> Result<Server, TransportError> {
        let socket = Socket::new(Protocol::Rep0)?;

        let mut pool = Vec::with_capacity(workers.max(1));
        for id in 0..workers.max(1) {
            let ctx = Context::new(&socket)?;
            let ctx_clone = ctx.clone();
            let worker = Arc::new(Worker {
                id,
                handler: handler.clone(),
                pending: Mutex::new(None),
            });
            let aio = Aio::new(move |aio, res| worker_callback(aio, &ctx_clone, res, &worker))?;
            pool.push((aio, ctx));
        }

        socket.listen(address)?;

        for (aio, ctx) in &pool {
            ctx.recv(aio)?;
        }

        info!(address, workers = pool.len(), "server listening");
        Ok(Server {
            workers: pool,
            socket,
            handler,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    /// Block, reaping idle sessions every tick. Returns after `exit_after`
    /// when given, otherwise never.
    pub fn run(&self, idle_timeout: Duration, exit_after: Option<Duration>) {
        let started = Instant::now();
        loop {
            std::thread::sleep(TICK);

            let reaped = self.handler.registry().reap_idle(idle_timeout);
            if !reaped.is_empty() {
                debug!(count = reaped.len(), "reaped idle sessions");
            }

            if exit_after.map_or(false, |limit| started.elapsed() >= limit) {
                info!(address = %self.address, "server stopping");
                return;
            }
        }
    }

    pub fn close(self) {
        let Server {
            workers, socket, ..
        } = self;
        for (aio, _) in &workers {
            aio.cancel();
        }
        drop(workers);
        socket.close();
    }
}

fn rearm(ctx: &Context, aio: &Aio, worker: &Worker) {
    if let Err(err) = ctx.recv(aio) {
        warn!(worker = worker.id, %err, "failed to re-arm receive");
    }
}

fn worker_callback(aio: Aio, ctx: &Context, res: AioResult, worker: &Worker) {
    match res {
        AioResult::Recv(Ok(msg)) => {
            let Reply { session, body } = worker.handler.handle_bytes(msg.as_slice());
            worker.set_pending(session);
            if let Err((_, err)) = ctx.send(&aio, Message::from(body.as_slice())) {
                worker.send_failed(err);
                rearm(ctx, &aio, worker);
            }
        }
        AioResult::Recv(Err(nng::Error::Closed)) | AioResult::Recv(Err(nng::Error::Canceled)) => {
            debug!(worker = worker.id, "worker stopped");
        }
        AioResult::Recv(Err(err)) => {
            warn!(worker = worker.id, %err, "receive failed");
            rearm(ctx, &aio, worker);
        }
        AioResult::Send(Ok(())) => {
            worker.take_pending();
            rearm(ctx, &aio, worker);
        }
        AioResult::Send(Err((_, err))) => {
            let stopped = matches!(err, nng::Error::Closed | nng::Error::Canceled);
            worker.send_failed(err);
            if !stopped {
                rearm(ctx, &aio, worker);
            }
        }
        AioResult::Sleep(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::arbiter::{Clock, ManualClock};
    use crate::catalog::SignCatalog;
    use crate::matcher::SignMatcher;
    use crate::motion::MotionAnalyzer;
    use crate::recognizer::Recognizer;
    use crate::sequence_model::SequenceModel;
    use crate::session::{SessionRegistry, SessionSettings};
    use crate::text2sign::TextToSign;

    fn make_handler() -> Arc<MessageHandler> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let recognizer = Recognizer::new(
            Arc::new(SignCatalog::default()),
            SignMatcher::default(),
            MotionAnalyzer::default(),
            Arc::new(SequenceModel::unloaded()),
            clock.clone(),
        );
        Arc::new(MessageHandler::new(
            Arc::new(SessionRegistry::new(SessionSettings::default(), clock)),
            Arc::new(recognizer),
            TextToSign::default(),
            false,
        ))
    }

    fn request(client: &Socket, body: &str) -> Vec<Value> {
        client.send(body.as_bytes()).map_err(|(_, e)| e).unwrap();
        let reply = client.recv().unwrap();
        serde_json::from_slice(reply.as_slice()).unwrap()
    }

    #[test]
    fn test_request_reply_over_inproc() {
        let address = "inproc://silentvoice-transport-test";
        let server = Server::bind(address, 2, make_handler()).unwrap();

        let client = Socket::new(Protocol::Req0).unwrap();
        client.dial(address).unwrap();

        let events = request(&client, r#"{"session": "a", "type": "connect"}"#);
        assert_eq!(events[0]["type"], "connection");
        assert_eq!(server.handler().registry().ids(), vec!["a".to_string()]);

        let events = request(&client, r#"{"session": "a", "type": "ping"}"#);
        assert_eq!(events[0]["type"], "pong");

        let events = request(&client, r#"{"session": "a", "type": "disconnect"}"#);
        assert_eq!(events[0]["type"], "disconnected");
        assert!(server.handler().registry().is_empty());

        server.close();
    }
}
