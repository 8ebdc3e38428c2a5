//! Single-writer worker thread for a session.
//!
//! The worker owns the [`SerialSession`] and serves requests from any number
//! of [`SessionHandle`]s one at a time, so producers on different threads
//! never race on the port. Each request carries its own reply channel.

use {
    crate::{error::SendError, port::PortBackend, session::SerialSession},
    log::{debug, warn},
    std::{
        sync::mpsc::{self, Receiver, Sender},
        thread::{self, JoinHandle},
    },
};

enum Request {
    Send {
        payload: Vec<u8>,
        reply: Sender<Result<(), SendError>>,
    },
    IsOpen {
        reply: Sender<bool>,
    },
    Close {
        reply: Sender<()>,
    },
    Shutdown,
}

/// Cloneable handle to a running [`SessionWorker`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<Request>,
}

impl SessionHandle {
    /// Send a payload through the worker and wait for the result.
    ///
    /// Reports [`SendError::NotConnected`] if the worker has exited.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(Request::Send {
                payload: payload.into(),
                reply,
            })
            .map_err(|_| SendError::NotConnected)?;
        rx.recv().unwrap_or(Err(SendError::NotConnected))
    }

    /// Whether the worker's session still holds an open port.
    pub fn is_open(&self) -> bool {
        let (reply, rx) = mpsc::channel();
        if self.tx.send(Request::IsOpen { reply }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    /// Close the session; later sends fail with `NotConnected`.
    pub fn close(&self) {
        let (reply, rx) = mpsc::channel();
        if self.tx.send(Request::Close { reply }).is_ok() {
            let _ = rx.recv();
        }
    }
}

/// Thread owning a session.
///
/// Dropping the worker (or calling [`SessionWorker::shutdown`]) closes the
/// session and joins the thread.
pub struct SessionWorker {
    handle: SessionHandle,
    thread: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Move `session` onto a new worker thread.
    pub fn spawn<B>(session: SerialSession<B>) -> std::io::Result<Self>
    where
        B: PortBackend + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("picolink-session".to_string())
            .spawn(move || serve(session, &rx))?;

        Ok(Self {
            handle: SessionHandle { tx },
            thread: Some(thread),
        })
    }

    /// Get a handle for submitting requests.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Close the session and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.tx.send(Request::Shutdown);
            if thread.join().is_err() {
                warn!("Session worker panicked");
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve<B: PortBackend>(mut session: SerialSession<B>, rx: &Receiver<Request>) {
    debug!("Session worker started");
    while let Ok(request) = rx.recv() {
        match request {
            Request::Send { payload, reply } => {
                let _ = reply.send(session.send(&payload));
            },
            Request::IsOpen { reply } => {
                let _ = reply.send(session.is_open());
            },
            Request::Close { reply } => {
                session.close();
                let _ = reply.send(());
            },
            Request::Shutdown => break,
        }
    }
    session.close();
    debug!("Session worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockBackend, WriteOutcome, usb_port};

    fn open_session() -> (SerialSession<MockBackend>, MockBackend) {
        let backend = MockBackend::with_ports(vec![usb_port("COM5", "Pico")]);
        let mut session = SerialSession::with_backend(backend.clone());
        session.open("COM5", 115200).unwrap();
        (session, backend)
    }

    #[test]
    fn test_sends_from_several_threads_are_serialized() {
        let (session, backend) = open_session();
        let worker = SessionWorker::spawn(session).unwrap();

        let threads: Vec<_> = (0..4u8)
            .map(|i| {
                let handle = worker.handle();
                thread::spawn(move || {
                    for _ in 0..10 {
                        handle.send(vec![i; 3]).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let written = backend.lock().written.clone();
        assert_eq!(written.len(), 4 * 10 * 3);
        for chunk in written.chunks(3) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
        worker.shutdown();
    }

    #[test]
    fn test_errors_are_returned_to_the_caller() {
        let (session, backend) = open_session();
        let worker = SessionWorker::spawn(session).unwrap();
        let handle = worker.handle();

        backend.script(WriteOutcome::Fail(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(handle.send(b"on\n".to_vec()), Err(SendError::Io { .. })));
        assert!(!handle.is_open());
        assert_eq!(handle.send(b"on\n".to_vec()), Err(SendError::NotConnected));
    }

    #[test]
    fn test_close_through_handle() {
        let (session, backend) = open_session();
        let worker = SessionWorker::spawn(session).unwrap();
        let handle = worker.handle();

        assert!(handle.is_open());
        handle.close();
        assert!(!handle.is_open());
        assert_eq!(backend.lock().live_handles, 0);
    }

    #[test]
    fn test_shutdown_closes_session_and_disconnects_handles() {
        let (session, backend) = open_session();
        let worker = SessionWorker::spawn(session).unwrap();
        let handle = worker.handle();

        worker.shutdown();
        assert_eq!(backend.lock().live_handles, 0);
        assert_eq!(handle.send(vec![1]), Err(SendError::NotConnected));
        assert!(!handle.is_open());
    }
}
