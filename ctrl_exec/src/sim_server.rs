//! # Simulator Server Module
//!
//! This module abstracts over the networking side of the control executable. The simulator bridge
//! connects to the server and forwards every socket.io frame it receives from the simulator, the
//! server must answer each one with exactly one reply frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions, MonitoredSocketError, NetParams},
    eqpt::sim::{SimEvent, SimReply, SimFrameError}
};
use log::warn;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// How long [`SimServer::get_event`] waits for a frame.
const RECV_TIMEOUT_MS: i32 = 200;

/// How long [`SimServer::send_reply`] waits for the reply to be queued.
const SEND_TIMEOUT_MS: i32 = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the control executable.
pub struct SimServer {

    /// REP socket which receives frames from the simulator bridge
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`SimServer`]
#[derive(thiserror::Error, Debug)]
pub enum SimServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not receive a frame from the simulator: {0}")]
    RecvError(zmq::Error),

    #[error("Could not parse the simulator frame: {0}")]
    FrameError(SimFrameError),

    #[error("Could not send the reply to the simulator: {0}")]
    SendError(zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServer {

    /// Create a new instance of the simulator server.
    ///
    /// This function will not wait for a connection from the bridge before returning.
    pub fn new(params: &NetParams) -> Result<Self, SimServerError> {
        Self::with_context(&zmq::Context::new(), &params.sim_endpoint)
    }

    /// Create a new server within an existing zmq context.
    pub fn with_context(ctx: &zmq::Context, endpoint: &str) -> Result<Self, SimServerError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: RECV_TIMEOUT_MS,
            send_timeout: SEND_TIMEOUT_MS,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            socket_options,
            endpoint
        )?;

        Ok(Self { socket })
    }

    /// Receive the next frame from the simulator bridge.
    ///
    /// Returns `Ok(None)` if no frame arrived before the timeout. Whenever a frame was received,
    /// including one which failed to parse (see [`SimServerError::needs_reply`]), the user MUST
    /// call [`SimServer::send_reply`] before calling this function again.
    ///
    /// If the previous frame was never answered the socket cannot receive. An empty reply is sent
    /// to put it back into the receiving state and `RecvError(EFSM)` is returned.
    pub fn get_event(&mut self) -> Result<Option<SimEvent>, SimServerError> {
        let msg = match self.socket.recv_msg(0) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(zmq::Error::EFSM) => {
                warn!("Previous frame was not answered, sending an empty reply");
                self.send_reply(&SimReply::None)?;
                return Err(SimServerError::RecvError(zmq::Error::EFSM));
            },
            Err(e) => return Err(SimServerError::RecvError(e))
        };

        match msg.as_str() {
            Some(s) => SimEvent::parse(s)
                .map(Some)
                .map_err(SimServerError::FrameError),
            None => {
                warn!("Received a frame which is not valid UTF-8, ignoring it");
                Ok(Some(SimEvent::Ignored))
            }
        }
    }

    /// Send a reply to the last received frame.
    pub fn send_reply(&mut self, reply: &SimReply) -> Result<(), SimServerError> {
        let frame = reply.to_frame()
            .map_err(SimServerError::FrameError)?;

        self.socket.send(frame.as_str(), 0)
            .map_err(SimServerError::SendError)
    }

    /// Returns true if the bridge is connected.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }
}

impl SimServerError {
    /// Returns true if a frame was received with this error, so a reply is still owed.
    pub fn needs_reply(&self) -> bool {
        matches!(self, SimServerError::FrameError(_))
    }
}

impl From<MonitoredSocketError> for SimServerError {
    fn from(e: MonitoredSocketError) -> Self {
        SimServerError::SocketError(e)
    }
}
