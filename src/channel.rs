//! Transport contract consumed by the client core

use crate::error::Result;

/// The physical transport: socket lifecycle, host failover and frame
/// correlation live behind this trait and are not implemented here. The
/// core treats the exchange as a synchronous call that either returns the
/// correlated response frame or fails with a timeout/disconnect mapped to
/// `GraphError::Transport`.
pub trait Channel {
    /// Send one request frame and block for the response frame correlated
    /// by `request_id`. One request in flight per handle.
    fn send_request(&mut self, frame: Vec<u8>, request_id: i64) -> Result<Vec<u8>>;

    /// Authentication token stamped into request headers.
    fn auth_token(&self) -> i64 {
        0
    }

    /// Session id stamped into request headers.
    fn session_id(&self) -> i64 {
        0
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}
