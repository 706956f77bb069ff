use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use crate::error::RtpError;
use crate::rtp::{RtpSession, RtpTransport};

/// Background thread sending periodic RTCP reports for one [`RtpSession`].
///
/// Stopping is synchronous: [`shutdown`](Self::shutdown) (or dropping the
/// task) wakes the thread, lets it finish any report in flight and joins it.
pub struct RtcpTask {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RtcpTask {
    pub fn spawn<T: RtpTransport>(session: RtpSession<T>) -> Result<Self, RtpError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("rtcp".to_string())
            .spawn(move || run(session, stop_rx))?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit. No report is sent once this
    /// returns; calling it again does nothing.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("RTCP thread panicked");
        }
    }
}

impl Drop for RtcpTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<T: RtpTransport>(session: RtpSession<T>, stop: Receiver<()>) {
    let ssrc = session.ssrc();
    tracing::debug!(ssrc = format_args!("{:#010X}", ssrc), "RTCP task started");
    loop {
        match stop.recv_timeout(session.next_interval()) {
            Err(RecvTimeoutError::Timeout) => {
                // Failures are counted by the session; try again next cycle.
                let _ = session.send_report();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if let Err(err) = session.send_bye() {
        tracing::warn!(error = %err, "RTCP BYE failed");
    }
    tracing::debug!(ssrc = format_args!("{:#010X}", ssrc), "RTCP task stopped");
}
