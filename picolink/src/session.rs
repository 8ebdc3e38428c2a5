//! Serial session management.
//!
//! A [`SerialSession`] owns at most one open port handle. It has two states,
//! closed and open; [`SerialSession::open`] and [`SerialSession::close`] move
//! between them, and an I/O failure during [`SerialSession::send`] drops back
//! to closed so the next send fails fast with [`SendError::NotConnected`].
//!
//! The session takes `&mut self` for every state change. Callers that need
//! several producers must serialize access themselves, for example through
//! [`crate::worker::SessionWorker`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use picolink::SerialSession;
//!
//! let mut session = SerialSession::new();
//! session.open("COM5", 115200)?;
//! session.send(&[0x7F])?;
//! session.close();
//! # Ok::<(), picolink::Error>(())
//! ```

use {
    crate::{
        discovery::{Discovery, PortDescriptor, discover_with},
        error::{OpenError, Result, SendError},
        port::{Port, PortBackend, SerialConfig, UNBOUNDED_TIMEOUT},
    },
    log::{debug, info, warn},
    std::{
        io::{ErrorKind, Write},
        time::Duration,
    },
};

#[cfg(feature = "native")]
use crate::port::NativeBackend;

/// How writes wait for the OS to accept data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Block until the OS buffer accepts the payload.
    #[default]
    Blocking,
    /// Return immediately with whatever the OS accepted.
    NonBlocking,
    /// Block for at most the given duration.
    Timeout(Duration),
}

impl WritePolicy {
    /// Write timeout applied to the port for this policy.
    pub fn timeout(self) -> Duration {
        match self {
            Self::Blocking => UNBOUNDED_TIMEOUT,
            Self::NonBlocking => Duration::ZERO,
            Self::Timeout(timeout) => timeout,
        }
    }
}

/// Identifies the port to open.
#[derive(Debug, Clone, Copy)]
pub enum PortSelector<'a> {
    /// Exact OS name of the port.
    Name(&'a str),
    /// Position in a list previously returned by discovery.
    ///
    /// The list is a snapshot: ports plugged or unplugged after it was
    /// captured are not reflected, so the index can go stale.
    Index {
        /// Captured discovery result.
        ports: &'a [PortDescriptor],
        /// Position in `ports`.
        index: usize,
    },
}

impl<'a> From<&'a str> for PortSelector<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for PortSelector<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name.as_str())
    }
}

impl<'a> From<&'a PortDescriptor> for PortSelector<'a> {
    fn from(descriptor: &'a PortDescriptor) -> Self {
        Self::Name(descriptor.system_name.as_str())
    }
}

struct OpenPort<P> {
    port: P,
    descriptor: PortDescriptor,
}

/// One serial connection and its lifecycle.
///
/// The OS handle is released by [`SerialSession::close`], by an I/O error
/// during a send, or when the session is dropped.
pub struct SerialSession<B: PortBackend> {
    backend: B,
    open: Option<OpenPort<B::Port>>,
    write_policy: WritePolicy,
}

/// Session using the operating system's serial ports.
#[cfg(feature = "native")]
pub type NativeSession = SerialSession<NativeBackend>;

#[cfg(feature = "native")]
impl SerialSession<NativeBackend> {
    /// Create a closed session over the native backend.
    pub fn new() -> Self {
        Self::with_backend(NativeBackend)
    }
}

#[cfg(feature = "native")]
impl Default for SerialSession<NativeBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PortBackend> SerialSession<B> {
    /// Create a closed session over the given backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            open: None,
            write_policy: WritePolicy::default(),
        }
    }

    /// List the ports currently visible through this session's backend.
    pub fn discover(&self) -> Discovery {
        discover_with(&self.backend)
    }

    /// Open a port with the blocking write policy.
    pub fn open<'a>(
        &mut self,
        selector: impl Into<PortSelector<'a>>,
        baud_rate: u32,
    ) -> std::result::Result<(), OpenError> {
        self.open_with_policy(selector, baud_rate, WritePolicy::Blocking)
    }

    /// Open a port with an explicit write policy.
    ///
    /// Fails with [`OpenError::AlreadyOpen`] without touching the current
    /// handle if this session is already open.
    pub fn open_with_policy<'a>(
        &mut self,
        selector: impl Into<PortSelector<'a>>,
        baud_rate: u32,
        write_policy: WritePolicy,
    ) -> std::result::Result<(), OpenError> {
        if let Some(open) = &self.open {
            return Err(OpenError::AlreadyOpen(open.descriptor.system_name.clone()));
        }

        let descriptor = self.resolve(selector.into())?;
        let config =
            SerialConfig::new(&descriptor.system_name, baud_rate).with_timeout(write_policy.timeout());

        debug!(
            "Opening {} at {} baud ({:?})",
            descriptor.system_name, baud_rate, write_policy
        );
        let port = self.backend.open(&config)?;
        info!("Connected to {} at {} baud", descriptor.system_name, baud_rate);

        self.write_policy = write_policy;
        self.open = Some(OpenPort { port, descriptor });
        Ok(())
    }

    fn resolve(&self, selector: PortSelector<'_>) -> std::result::Result<PortDescriptor, OpenError> {
        match selector {
            // Unlisted names (virtual ports, failed enumeration) go to the OS as-is.
            PortSelector::Name(name) => Ok(self
                .discover()
                .find(|p| p.system_name == name)
                .unwrap_or_else(|| PortDescriptor::from_name(name))),
            PortSelector::Index { ports, index } => ports
                .get(index)
                .cloned()
                .ok_or_else(|| OpenError::NotFound(format!("port index {index}"))),
        }
    }

    /// Write `payload` verbatim.
    ///
    /// Issues exactly one write call. A partial write is reported as
    /// [`SendError::ShortWrite`] and the session stays open; any other I/O
    /// failure closes the session.
    pub fn send(&mut self, payload: &[u8]) -> std::result::Result<(), SendError> {
        let Some(open) = self.open.as_mut() else {
            return Err(SendError::NotConnected);
        };
        if payload.is_empty() {
            return Ok(());
        }

        let expected = payload.len();
        match open.port.write(payload) {
            Ok(written) if written == expected => {},
            Ok(written) => {
                debug!("Short write on {}: {written}/{expected}", open.descriptor.system_name);
                return Err(SendError::ShortWrite { written, expected });
            },
            Err(e) if is_transient(e.kind()) => {
                debug!("Write on {} accepted nothing: {e}", open.descriptor.system_name);
                return Err(SendError::ShortWrite {
                    written: 0,
                    expected,
                });
            },
            Err(e) => return Err(self.fail(&e)),
        }

        match open.port.flush() {
            Ok(()) => Ok(()),
            Err(e) if is_transient(e.kind()) => Ok(()),
            Err(e) => Err(self.fail(&e)),
        }
    }

    fn fail(&mut self, err: &std::io::Error) -> SendError {
        if let Some(open) = self.open.take() {
            warn!(
                "I/O error on {}, closing session: {err}",
                open.descriptor.system_name
            );
        }
        SendError::Io {
            detail: err.to_string(),
        }
    }

    /// Release the handle. Does nothing when already closed.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            drop(open.port);
            info!("Closed {}", open.descriptor.system_name);
        }
    }

    /// Change the write policy, applying it to the open handle if any.
    pub fn set_write_policy(&mut self, write_policy: WritePolicy) -> Result<()> {
        if let Some(open) = self.open.as_mut() {
            open.port.set_timeout(write_policy.timeout())?;
        }
        self.write_policy = write_policy;
        Ok(())
    }

    /// Whether a handle is held.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Descriptor of the open port.
    pub fn descriptor(&self) -> Option<&PortDescriptor> {
        self.open.as_ref().map(|open| &open.descriptor)
    }

    /// Baud rate of the open port.
    pub fn baud_rate(&self) -> Option<u32> {
        self.open.as_ref().map(|open| open.port.baud_rate())
    }

    /// Current write policy.
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }
}

impl<B: PortBackend> Drop for SerialSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockBackend, WriteOutcome, plain_port, usb_port};

    fn session_with(ports: Vec<crate::port::PortInfo>) -> (SerialSession<MockBackend>, MockBackend) {
        let backend = MockBackend::with_ports(ports);
        (SerialSession::with_backend(backend.clone()), backend)
    }

    #[test]
    fn test_open_send_close_then_send_fails() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);

        session.open("COM5", 115200).unwrap();
        assert!(session.is_open());
        assert_eq!(session.baud_rate(), Some(115200));
        assert_eq!(session.descriptor().unwrap().system_name, "COM5");

        session.send(&[0x7F]).unwrap();
        assert_eq!(backend.lock().written, vec![0x7F]);

        session.close();
        assert!(!session.is_open());
        assert_eq!(backend.lock().live_handles, 0);
        assert_eq!(session.send(&[0x00]), Err(SendError::NotConnected));
    }

    #[test]
    fn test_open_applies_blocking_policy() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 9600).unwrap();

        let config = backend.lock().last_config.clone().unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, UNBOUNDED_TIMEOUT);
        assert_eq!(session.write_policy(), WritePolicy::Blocking);
    }

    #[test]
    fn test_open_unknown_name_is_not_found() {
        let (mut session, backend) = session_with(vec![plain_port("COM1")]);
        let err = session.open("COM9", 115200).unwrap_err();
        assert!(matches!(err, OpenError::NotFound(ref name) if name == "COM9"));
        assert!(!session.is_open());
        assert_eq!(backend.lock().open_calls, 1);
        assert_eq!(backend.lock().live_handles, 0);
    }

    #[test]
    fn test_open_name_requires_exact_match() {
        let (mut session, _backend) = session_with(vec![plain_port("COM10")]);
        assert!(matches!(
            session.open("COM1", 115200),
            Err(OpenError::NotFound(_))
        ));
        assert!(matches!(
            session.open("com10", 115200),
            Err(OpenError::NotFound(_))
        ));
    }

    #[test]
    fn test_open_by_name_when_enumeration_fails() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        backend.lock().list_error = true;

        session.open("COM5", 115200).unwrap();
        assert!(session.is_open());
        assert_eq!(backend.lock().open_calls, 1);
        assert_eq!(session.descriptor().unwrap().system_name, "COM5");
        session.send(&[0x7F]).unwrap();
        assert_eq!(backend.lock().written, vec![0x7F]);
    }

    #[test]
    fn test_open_unlisted_name_uses_name_only_descriptor() {
        let (mut session, backend) = session_with(vec![]);
        backend.lock().unlisted.push("/dev/pts/4".to_string());

        session.open("/dev/pts/4", 9600).unwrap();
        let descriptor = session.descriptor().unwrap();
        assert_eq!(descriptor.system_name, "/dev/pts/4");
        assert_eq!(descriptor.vid, None);
        assert_eq!(session.baud_rate(), Some(9600));
    }

    #[test]
    fn test_open_non_target_by_exact_name() {
        let (mut session, _backend) = session_with(vec![plain_port("COM3")]);
        session.open("COM3", 115200).unwrap();
        assert!(!session.descriptor().unwrap().is_likely_target);
    }

    #[test]
    fn test_open_by_index() {
        let (mut session, _backend) =
            session_with(vec![plain_port("COM1"), usb_port("COM5", "Pico")]);
        let ports: Vec<PortDescriptor> = session.discover().collect();

        session
            .open(PortSelector::Index { ports: &ports, index: 1 }, 115200)
            .unwrap();
        assert_eq!(session.descriptor().unwrap().system_name, "COM5");
    }

    #[test]
    fn test_open_by_index_out_of_range() {
        let (mut session, _backend) = session_with(vec![plain_port("COM1")]);
        let ports: Vec<PortDescriptor> = session.discover().collect();
        let err = session
            .open(PortSelector::Index { ports: &ports, index: 3 }, 115200)
            .unwrap_err();
        assert!(matches!(err, OpenError::NotFound(_)));
    }

    #[test]
    fn test_open_twice_is_already_open() {
        let (mut session, backend) =
            session_with(vec![usb_port("COM5", "Pico"), usb_port("COM6", "Pico")]);
        session.open("COM5", 115200).unwrap();

        let err = session.open("COM6", 9600).unwrap_err();
        assert!(matches!(err, OpenError::AlreadyOpen(ref name) if name == "COM5"));

        let state = backend.lock();
        assert_eq!(state.open_calls, 1);
        assert_eq!(state.live_handles, 1);
        drop(state);
        assert_eq!(session.descriptor().unwrap().system_name, "COM5");
        assert_eq!(session.baud_rate(), Some(115200));
    }

    #[test]
    fn test_open_rejected_by_os() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        backend.lock().reject_open = Some("Access is denied.".to_string());

        let err = session.open("COM5", 115200).unwrap_err();
        assert!(matches!(err, OpenError::OsRejected { .. }));
        assert!(!session.is_open());
        assert_eq!(backend.lock().live_handles, 0);
    }

    #[test]
    fn test_send_never_opened_makes_no_os_call() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        assert_eq!(session.send(b"on\n"), Err(SendError::NotConnected));
        let state = backend.lock();
        assert_eq!(state.open_calls, 0);
        assert_eq!(state.write_calls, 0);
    }

    #[test]
    fn test_short_write_keeps_session_open() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 115200).unwrap();
        backend.script(WriteOutcome::Accept(2));

        let err = session.send(b"LED ROT\n").unwrap_err();
        assert_eq!(
            err,
            SendError::ShortWrite {
                written: 2,
                expected: 8
            }
        );
        assert!(session.is_open());
        assert_eq!(backend.lock().write_calls, 1);
        assert_eq!(backend.lock().written, b"LE".to_vec());
    }

    #[test]
    fn test_timed_out_write_is_short_write() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 115200).unwrap();
        backend.script(WriteOutcome::Fail(std::io::ErrorKind::TimedOut));

        let err = session.send(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            SendError::ShortWrite {
                written: 0,
                expected: 3
            }
        );
        assert!(session.is_open());
    }

    #[test]
    fn test_io_error_closes_session() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 115200).unwrap();
        backend.script(WriteOutcome::Fail(std::io::ErrorKind::BrokenPipe));

        let err = session.send(b"off\n").unwrap_err();
        assert!(matches!(err, SendError::Io { .. }));
        assert!(!session.is_open());
        assert_eq!(backend.lock().live_handles, 0);

        assert_eq!(session.send(b"off\n"), Err(SendError::NotConnected));
        assert_eq!(backend.lock().write_calls, 1);
    }

    #[test]
    fn test_reopen_after_io_error() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 115200).unwrap();
        backend.script(WriteOutcome::Fail(std::io::ErrorKind::BrokenPipe));
        let _ = session.send(&[0]);

        session.open("COM5", 115200).unwrap();
        session.send(&[0x42]).unwrap();
        assert_eq!(backend.lock().written, vec![0x42]);
    }

    #[test]
    fn test_empty_payload_is_ok_without_write() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.open("COM5", 115200).unwrap();
        session.send(&[]).unwrap();
        assert_eq!(backend.lock().write_calls, 0);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session.close();
        session.open("COM5", 115200).unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(backend.lock().live_handles, 0);
    }

    #[test]
    fn test_drop_releases_handle() {
        let backend = MockBackend::with_ports(vec![usb_port("COM5", "Pico")]);
        {
            let mut session = SerialSession::with_backend(backend.clone());
            session.open("COM5", 115200).unwrap();
            assert_eq!(backend.lock().live_handles, 1);
        }
        assert_eq!(backend.lock().live_handles, 0);
    }

    #[test]
    fn test_set_write_policy_on_open_port() {
        let (mut session, backend) = session_with(vec![usb_port("COM5", "Pico")]);
        session
            .open_with_policy("COM5", 115200, WritePolicy::NonBlocking)
            .unwrap();
        assert_eq!(
            backend.lock().last_config.clone().unwrap().timeout,
            Duration::ZERO
        );

        let bounded = WritePolicy::Timeout(Duration::from_millis(250));
        session.set_write_policy(bounded).unwrap();
        assert_eq!(session.write_policy(), bounded);
        assert_eq!(backend.lock().timeouts, vec![Duration::from_millis(250)]);
    }

    #[test]
    fn test_set_write_policy_when_closed() {
        let (mut session, backend) = session_with(vec![]);
        session.set_write_policy(WritePolicy::NonBlocking).unwrap();
        assert_eq!(session.write_policy(), WritePolicy::NonBlocking);
        assert!(backend.lock().timeouts.is_empty());
    }

    #[test]
    fn test_write_policy_timeouts() {
        assert_eq!(WritePolicy::Blocking.timeout(), UNBOUNDED_TIMEOUT);
        assert_eq!(WritePolicy::NonBlocking.timeout(), Duration::ZERO);
        assert_eq!(
            WritePolicy::Timeout(Duration::from_secs(1)).timeout(),
            Duration::from_secs(1)
        );
    }
}
