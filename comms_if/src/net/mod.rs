//! # Network Module
//!
//! Networking over zmq. The simulator bridge talks to the controller through a single socket, this
//! module wraps that socket with a monitor so the executable can tell when the bridge comes and
//! goes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, AtomicUsize, Ordering}},
    thread,
};
use log::{debug, warn};
use serde::Deserialize;
use zmq::{Context, Socket, SocketEvent, SocketType};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout on the monitor socket, bounds how long dropping a [`MonitoredSocket`] takes.
const MONITOR_RECV_TIMEOUT_MS: i32 = 100;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Source of unique monitor endpoint names.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetParams {
    /// Endpoint the simulator bridge connects to, for example `"tcp://*:4567"`.
    pub sim_endpoint: String,
}

/// A zmq socket with a background thread tracking whether a peer is connected.
///
/// Derefs to the underlying [`zmq::Socket`] for sending and receiving.
pub struct MonitoredSocket {
    socket: Socket,

    monitor: Option<thread::JoinHandle<()>>,

    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>
}

/// Options applied to a [`MonitoredSocket`].
///
/// Timeouts are in milliseconds and follow the
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) conventions, `-1` waits forever.
#[derive(Debug, Clone)]
pub struct SocketOptions {

    /// Bind to the endpoint (servers) rather than connecting to it (clients).
    ///
    /// Default `false`.
    pub bind: bool,

    /// Wait in [`MonitoredSocket::new`] until the socket has connected. Only meaningful for
    /// clients, servers must set this to `false`.
    ///
    /// Default `true`.
    pub block_on_first_connect: bool,

    /// `ZMQ_LINGER`: how long unsent messages are kept after the socket is closed
    pub linger: i32,

    /// `ZMQ_CONNECT_TIMEOUT`: timeout of a `connect()`, `0` uses the OS default
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`: maximum time before a recv returns `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`: maximum time before a send returns `EAGAIN`
    pub send_timeout: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect or bind the socket: {0:?}")]
    CouldNotConnect(Option<zmq::Error>),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create a new monitored socket and connect or bind it to `endpoint`.
    ///
    /// The monitor is attached before the socket connects so that no connection event is missed.
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        socket_options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx.socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );
        let monitor = open_monitor(ctx, &socket, &monitor_endpoint)?;

        socket_options.set(&socket)?;

        match socket_options.bind {
            true => socket.bind(endpoint),
            false => socket.connect(endpoint)
        }.map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        let connected = Arc::new(AtomicBool::new(false));

        if socket_options.block_on_first_connect {
            wait_for_connection(&monitor)?;
            connected.store(true, Ordering::Relaxed);
        }

        // From now on the monitor must time out so the thread sees shutdown requests
        monitor.set_rcvtimeo(MONITOR_RECV_TIMEOUT_MS)
            .map_err(|e| MonitoredSocketError::SocketOptionError("set_rcvtimeo".into(), e))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let monitor_handle = {
            let shutdown = shutdown.clone();
            let connected = connected.clone();
            thread::spawn(move || monitor_socket(monitor, monitor_endpoint, shutdown, connected))
        };

        Ok(Self {
            socket,
            monitor: Some(monitor_handle),
            shutdown,
            connected
        })
    }

    /// Returns true while a peer is connected.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!("Socket monitor thread panicked");
            }
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        set_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_connect_timeout, self.connect_timeout),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout)
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            bind: false,
            block_on_first_connect: true,
            linger: 30_000,
            connect_timeout: 0,
            recv_timeout: -1,
            send_timeout: -1
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Enable monitoring on `socket` and connect a PAIR socket to receive the events.
fn open_monitor(
    ctx: &Context,
    socket: &Socket,
    monitor_endpoint: &str
) -> Result<Socket, MonitoredSocketError> {
    socket.monitor(monitor_endpoint, SocketEvent::ALL as i32)
        .map_err(MonitoredSocketError::MonitoringEnableError)?;

    let monitor = ctx.socket(zmq::PAIR)
        .map_err(MonitoredSocketError::CreateSocketError)?;
    monitor.connect(monitor_endpoint)
        .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

    Ok(monitor)
}

/// Block until the monitor reports a connection.
fn wait_for_connection(monitor: &Socket) -> Result<(), MonitoredSocketError> {
    loop {
        match read_event(monitor).map_err(MonitoredSocketError::EventReadError)? {
            SocketEvent::CONNECTED => return Ok(()),
            SocketEvent::CONNECT_DELAYED => continue,
            _ => return Err(MonitoredSocketError::CouldNotConnect(None))
        }
    }
}

/// Read an event from a monitor socket.
fn read_event(monitor: &Socket) -> Result<SocketEvent, zmq::Error> {
    let msg = monitor.recv_msg(0)?;

    if msg.len() < 2 {
        return Err(zmq::Error::EPROTO);
    }

    let event = u16::from_ne_bytes([msg[0], msg[1]]);

    // Second frame is the peer address
    if monitor.get_rcvmore()? {
        monitor.recv_msg(0)?;
    }

    Ok(SocketEvent::from_raw(event))
}

/// Update `connected` from the monitor's events until `shutdown` is set.
fn monitor_socket(
    monitor: Socket,
    monitor_endpoint: String,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>
) {
    while !shutdown.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Error reading event from monitor {}: {}", monitor_endpoint, e);
                break
            }
        };

        match event {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED => {
                debug!("{}: peer connected", monitor_endpoint);
                connected.store(true, Ordering::Relaxed)
            },
            SocketEvent::DISCONNECTED => {
                debug!("{}: peer disconnected", monitor_endpoint);
                connected.store(false, Ordering::Relaxed)
            },
            _ => ()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_net_params_deserialize() {
        let params: NetParams = serde_json::from_str(
            r#"{"sim_endpoint": "tcp://*:4567"}"#
        ).unwrap();

        assert_eq!(params.sim_endpoint, "tcp://*:4567");
    }

    #[test]
    fn test_socket_options_default() {
        let opts = SocketOptions::default();
        assert!(!opts.bind);
        assert!(opts.block_on_first_connect);
        assert_eq!(opts.recv_timeout, -1);
    }

    #[test]
    fn test_bound_socket_drops_cleanly() {
        let ctx = zmq::Context::new();
        let opts = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(&ctx, zmq::REP, opts, "inproc://net_test").unwrap();
        assert!(!socket.connected());

        // Nothing to receive
        assert!(socket.recv_msg(0).is_err());
    }
}
